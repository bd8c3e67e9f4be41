use std::any::type_name;

use anyhow::Context;
use serde_json::Value;
use tracing::debug;
use txstate::{ComponentConfig, Connector, StateConfig, StoredValue, Subroot, TransactionalState};

/// One store operation requested on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Get { path: String },
    Set { path: String, value: String, type_name: Option<String> },
    Delete { path: String },
    List { path: String },
    Mkdir { path: String },
}

/// Open the store, perform `action`, close the store. Returns what to print.
pub fn run<K: Connector>(
    connector: &K,
    conf: &StateConfig,
    component: Option<&ComponentConfig>,
    id: &str,
    subroot: Subroot,
    action: Action,
) -> anyhow::Result<String> {
    debug!(%id, %subroot, ?action, "running state command");
    let state = TransactionalState::open(connector, conf, id, component, subroot)
        .with_context(|| format!("opening {subroot} state for {id}"))?;

    let output = match action {
        Action::Get { path } => match state.get_value(&path)? {
            Some(stored) => serde_json::to_string_pretty(&stored.value)?,
            None => "(absent)".to_string(),
        },
        Action::Set { path, value, type_name } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("value for {path} is not valid JSON"))?;
            let stored = StoredValue {
                type_name: type_name.unwrap_or_else(|| infer_type_name(&value).to_string()),
                value,
            };
            state.set_value(&path, &stored)?.label().to_string()
        }
        Action::Delete { path } => state.delete(&path)?.label().to_string(),
        Action::List { path } => state.list(&path)?.join("\n"),
        Action::Mkdir { path } => state.mkdir(&path)?.label().to_string(),
    };

    state.close()?;
    Ok(output)
}

/// Pick the Rust type a typed reader would most likely ask for.
fn infer_type_name(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => type_name::<bool>(),
        Value::Number(n) if n.is_u64() => type_name::<u64>(),
        Value::Number(n) if n.is_i64() => type_name::<i64>(),
        Value::Number(_) => type_name::<f64>(),
        Value::String(_) => type_name::<String>(),
        _ => type_name::<Value>(),
    }
}
