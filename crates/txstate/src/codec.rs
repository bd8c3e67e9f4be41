//! Serializer/deserializer pair for stored values.
//!
//! Values are JSON-encoded inside an envelope that records the value's type.
//! Types listed in the configuration's registrations are written by id,
//! everything else by full type name. Both halves are built from the same
//! merged configuration, so a store decodes exactly what its producer wrote;
//! when they disagree the mismatch is a deserialization error.

use std::any::type_name;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::StateConfig;
use crate::error::{StateError, StateResult};

/// Dense ids for registered type names, in registration order.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    names: Vec<String>,
    ids: HashMap<String, u32>,
}

impl TypeRegistry {
    pub fn new(registrations: &[String]) -> Self {
        let mut registry = Self::default();
        for name in registrations {
            if registry.ids.contains_key(name) {
                continue;
            }
            registry.ids.insert(name.clone(), registry.names.len() as u32);
            registry.names.push(name.clone());
        }
        registry
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.names.get(id as usize).map(String::as_str)
    }

    fn tag_for(&self, name: &str) -> TypeTag {
        match self.id_of(name) {
            Some(id) => TypeTag::Id(id),
            None => TypeTag::Name(name.to_string()),
        }
    }

    fn resolve(&self, tag: TypeTag) -> StateResult<String> {
        match tag {
            TypeTag::Id(id) => self.name_of(id).map(String::from).ok_or_else(|| {
                StateError::Deserialize(format!("unregistered type id {id}"))
            }),
            TypeTag::Name(name) => Ok(name),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TypeTag {
    Id(u32),
    Name(String),
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "type")]
    tag: TypeTag,
    value: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    tag: TypeTag,
    value: serde_json::Value,
}

/// A decoded value whose Rust type is not known to the reader.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub type_name: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ValuesSerializer {
    registry: TypeRegistry,
}

impl ValuesSerializer {
    pub fn new(conf: &StateConfig) -> Self {
        Self {
            registry: TypeRegistry::new(&conf.registrations),
        }
    }

    pub fn serialize<T: Serialize>(&self, value: &T) -> StateResult<Vec<u8>> {
        let envelope = EnvelopeRef {
            tag: self.registry.tag_for(type_name::<T>()),
            value,
        };
        serde_json::to_vec(&envelope).map_err(|e| StateError::Serialize(e.to_string()))
    }

    /// Encode an untyped JSON value under an explicit type name.
    pub fn serialize_value(&self, value: &StoredValue) -> StateResult<Vec<u8>> {
        let envelope = EnvelopeRef {
            tag: self.registry.tag_for(&value.type_name),
            value: &value.value,
        };
        serde_json::to_vec(&envelope).map_err(|e| StateError::Serialize(e.to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct ValuesDeserializer {
    registry: TypeRegistry,
}

impl ValuesDeserializer {
    pub fn new(conf: &StateConfig) -> Self {
        Self {
            registry: TypeRegistry::new(&conf.registrations),
        }
    }

    pub fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> StateResult<T> {
        let stored = self.deserialize_value(bytes)?;
        let expected = type_name::<T>();
        if stored.type_name != expected {
            return Err(StateError::Deserialize(format!(
                "stored value has type {}, requested {expected}",
                stored.type_name
            )));
        }
        serde_json::from_value(stored.value).map_err(|e| StateError::Deserialize(e.to_string()))
    }

    pub fn deserialize_value(&self, bytes: &[u8]) -> StateResult<StoredValue> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| StateError::Deserialize(e.to_string()))?;
        Ok(StoredValue {
            type_name: self.registry.resolve(envelope.tag)?,
            value: envelope.value,
        })
    }
}
