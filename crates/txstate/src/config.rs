//! Typed configuration for the transactional state store.
//!
//! Connection settings come in two layers: the global `[zookeeper]` section
//! and an optional `[transactional]` section that overrides servers and port
//! for transactional state only. [`with_backup`] picks between them.
//!
//! ```toml
//! transactional_root = "/transactional"
//! registrations = ["u64"]
//!
//! [zookeeper]
//! servers = ["zk1.internal", "zk2.internal"]
//! port = 2181
//!
//! [transactional]
//! servers = ["zk-tx.internal"]
//!
//! [acl]
//! topology_auth_scheme = "digest"
//! superacl = "sasl:storm"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

pub const DEFAULT_TRANSACTIONAL_ROOT: &str = "/transactional";
pub const DEFAULT_PORT: u16 = 2181;
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 20_000;

/// Top-level store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_transactional_root")]
    pub transactional_root: String,
    /// Type registrations shared by serializer and deserializer.
    #[serde(default)]
    pub registrations: Vec<String>,
    #[serde(default)]
    pub zookeeper: ZookeeperConfig,
    #[serde(default)]
    pub transactional: TransactionalOverrides,
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub acl: AclConfig,
}

/// Global coordination-service connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZookeeperConfig {
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

/// Transaction-scoped overrides of the global connection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionalOverrides {
    pub servers: Option<Vec<String>>,
    pub port: Option<u16>,
}

/// Credentials added to every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub scheme: String,
    pub payload: String,
}

/// Where node ACLs come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AclConfig {
    pub topology_auth_scheme: Option<String>,
    /// Super-user principal, `scheme:id`.
    pub superacl: Option<String>,
}

/// Component-level configuration. Only its registrations matter here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(default)]
    pub registrations: Vec<String>,
}

fn default_transactional_root() -> String {
    DEFAULT_TRANSACTIONAL_ROOT.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT_MS
}

impl Default for ZookeeperConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            port: DEFAULT_PORT,
            session_timeout_ms: DEFAULT_SESSION_TIMEOUT_MS,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            transactional_root: default_transactional_root(),
            registrations: Vec::new(),
            zookeeper: ZookeeperConfig::default(),
            transactional: TransactionalOverrides::default(),
            auth: None,
            acl: AclConfig::default(),
        }
    }
}

/// Primary value if present, otherwise the backup (which may be absent too).
pub fn with_backup<T: Clone>(primary: Option<&T>, backup: Option<&T>) -> Option<T> {
    primary.or(backup).cloned()
}

impl StateConfig {
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> StateResult<Self> {
        toml::from_str(content).map_err(|e| StateError::Config(e.to_string()))
    }

    /// A copy whose registrations are replaced by the component's, so this
    /// store decodes exactly what the component encodes.
    pub fn merged_with(&self, component: Option<&ComponentConfig>) -> StateConfig {
        let mut merged = self.clone();
        if let Some(component) = component {
            merged.registrations = component.registrations.clone();
        }
        merged
    }

    pub fn resolve_servers(&self) -> Option<Vec<String>> {
        with_backup(
            self.transactional.servers.as_ref(),
            Some(&self.zookeeper.servers),
        )
    }

    pub fn resolve_port(&self) -> Option<u16> {
        with_backup(self.transactional.port.as_ref(), Some(&self.zookeeper.port))
    }

    /// Resolve everything needed to open a session.
    pub fn connect_params(&self) -> StateResult<ConnectParams> {
        let servers = self
            .resolve_servers()
            .filter(|servers| !servers.is_empty())
            .ok_or_else(|| StateError::Config("no coordination servers configured".into()))?;
        let port = self
            .resolve_port()
            .ok_or_else(|| StateError::Config("no coordination port configured".into()))?;

        Ok(ConnectParams {
            servers,
            port,
            session_timeout: Duration::from_millis(self.zookeeper.session_timeout_ms),
            auth: self.auth.clone(),
        })
    }
}

impl ComponentConfig {
    pub fn from_file(path: &Path) -> StateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StateError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| StateError::Config(e.to_string()))
    }
}

/// Resolved connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectParams {
    pub servers: Vec<String>,
    pub port: u16,
    pub session_timeout: Duration,
    pub auth: Option<AuthConfig>,
}

impl ConnectParams {
    /// `host:port,host:port[/chroot]`. Servers that already name a port are
    /// kept as given.
    pub fn connect_string(&self, chroot: Option<&str>) -> String {
        let hosts = self
            .servers
            .iter()
            .map(|server| {
                if server.contains(':') {
                    server.clone()
                } else {
                    format!("{server}:{}", self.port)
                }
            })
            .collect::<Vec<_>>()
            .join(",");
        match chroot {
            Some(root) => format!("{hosts}{root}"),
            None => hosts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_backup_prefers_primary() {
        assert_eq!(with_backup(Some(&1), Some(&2)), Some(1));
        assert_eq!(with_backup(None, Some(&2)), Some(2));
        assert_eq!(with_backup::<u16>(None, None), None);
    }

    #[test]
    fn parse_minimal() {
        let conf = StateConfig::from_toml_str(
            r#"
[zookeeper]
servers = ["zk1"]
"#,
        )
        .unwrap();
        assert_eq!(conf.transactional_root, "/transactional");
        assert_eq!(conf.zookeeper.port, 2181);
        assert_eq!(conf.zookeeper.session_timeout_ms, 20_000);
        assert!(conf.registrations.is_empty());
        assert!(conf.auth.is_none());
    }

    #[test]
    fn transactional_overrides_win() {
        let conf = StateConfig::from_toml_str(
            r#"
[zookeeper]
servers = ["zk1", "zk2"]
port = 2181

[transactional]
servers = ["tx1"]
port = 3181
"#,
        )
        .unwrap();
        assert_eq!(conf.resolve_servers(), Some(vec!["tx1".to_string()]));
        assert_eq!(conf.resolve_port(), Some(3181));
    }

    #[test]
    fn global_settings_are_the_fallback() {
        let mut conf = StateConfig::default();
        conf.zookeeper.servers = vec!["zk1".into()];
        conf.transactional.port = Some(4000);
        assert_eq!(conf.resolve_servers(), Some(vec!["zk1".to_string()]));
        assert_eq!(conf.resolve_port(), Some(4000));
    }

    #[test]
    fn connect_params_require_servers() {
        let err = StateConfig::default().connect_params().unwrap_err();
        assert!(matches!(err, StateError::Config(_)));
    }

    #[test]
    fn connect_string_rendering() {
        let mut conf = StateConfig::default();
        conf.zookeeper.servers = vec!["zk1".into(), "zk2:2888".into()];
        let params = conf.connect_params().unwrap();
        assert_eq!(params.connect_string(None), "zk1:2181,zk2:2888");
        assert_eq!(
            params.connect_string(Some("/transactional/t/user")),
            "zk1:2181,zk2:2888/transactional/t/user"
        );
    }

    #[test]
    fn component_registrations_replace_global_ones() {
        let conf = StateConfig {
            registrations: vec!["a".into(), "b".into()],
            ..StateConfig::default()
        };
        assert_eq!(conf.merged_with(None).registrations, vec!["a", "b"]);

        let component = ComponentConfig {
            registrations: vec!["c".into()],
        };
        assert_eq!(conf.merged_with(Some(&component)).registrations, vec!["c"]);

        let empty = ComponentConfig::default();
        assert!(conf.merged_with(Some(&empty)).registrations.is_empty());
    }

    #[test]
    fn from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txstate.toml");
        std::fs::write(
            &path,
            r#"
transactional_root = "/tx"
registrations = ["u64"]

[zookeeper]
servers = ["zk1"]

[auth]
scheme = "digest"
payload = "storm:secret"

[acl]
topology_auth_scheme = "digest"
superacl = "sasl:storm"
"#,
        )
        .unwrap();

        let conf = StateConfig::from_file(&path).unwrap();
        assert_eq!(conf.transactional_root, "/tx");
        assert_eq!(conf.registrations, vec!["u64"]);
        assert_eq!(conf.auth.unwrap().scheme, "digest");
        assert_eq!(conf.acl.superacl.as_deref(), Some("sasl:storm"));
    }

    #[test]
    fn from_file_missing_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StateConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, StateError::Config(_)));
    }
}
