//! Envelope tipado del estado de diálogo y el identificador de thread.
//!
//! El documento persistido es un objeto JSON plano: cuatro claves reservadas
//! (`_schema_version`, `_version`, `_tenant_id`, `_updated_at`) administradas
//! por el store y cualquier otra clave como payload opaco del llamador.
//! `DialogueState` separa ambas partes para que los metadatos queden
//! verificados por el compilador mientras el payload sigue siendo flexible.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::constants::{CURRENT_SCHEMA_VERSION, RESERVED_KEYS, SCHEMA_VERSION_KEY, TENANT_ID_KEY, UPDATED_AT_KEY,
                       VERSION_KEY};

/// Identificador del thread dueño del estado (entidad externa al store).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ThreadId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateDecodeError {
    #[error("state document must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("invalid `{key}`: {reason}")]
    InvalidField { key: &'static str, reason: String },
}

/// Estado de diálogo de un thread.
///
/// `version` es el token de concurrencia: estrictamente creciente en cada
/// escritura exitosa. Documentos heredados sin `_version` se decodifican con
/// versión 0 (equivalente a "nunca versionado").
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueState {
    pub schema_version: String,
    pub version: u64,
    pub tenant_id: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub payload: Map<String, Value>,
}

impl Default for DialogueState {
    fn default() -> Self {
        Self { schema_version: CURRENT_SCHEMA_VERSION.to_string(),
               version: 0,
               tenant_id: None,
               updated_at: None,
               payload: Map::new() }
    }
}

impl DialogueState {
    /// Construye un estado (sin versionar) a partir de un payload.
    pub fn with_payload(payload: Map<String, Value>) -> Self {
        Self { payload, ..Self::default() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Inserta/reemplaza una clave del payload. Las claves reservadas se
    /// ignoran (devuelve `None`); se modifican vía los campos tipados.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        if is_reserved(&key) {
            return None;
        }
        self.payload.insert(key, value)
    }

    /// Decodifica un documento persistido.
    ///
    /// Tolerante con datos heredados:
    /// - `_version` acepta entero o string numérico; ausente/null => 0.
    /// - `_schema_version` ausente => versión de esquema actual.
    /// - `_tenant_id` vacío => `None`.
    /// - `_updated_at` no parseable => `None`.
    pub fn from_document(doc: Value) -> Result<Self, StateDecodeError> {
        let mut map = match doc {
            Value::Object(map) => map,
            other => return Err(StateDecodeError::NotAnObject(json_kind(&other))),
        };
        let version = match map.remove(VERSION_KEY) {
            None | Some(Value::Null) => 0,
            Some(v) => parse_version(&v).ok_or_else(|| StateDecodeError::InvalidField { key: VERSION_KEY,
                                                                                         reason: format!("expected non-negative integer, got {v}") })?,
        };
        let schema_version = match map.remove(SCHEMA_VERSION_KEY) {
            Some(Value::String(s)) => s,
            _ => CURRENT_SCHEMA_VERSION.to_string(),
        };
        let tenant_id = match map.remove(TENANT_ID_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        };
        let updated_at = match map.remove(UPDATED_AT_KEY) {
            Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s).ok().map(|d| d.with_timezone(&Utc)),
            _ => None,
        };
        Ok(Self { schema_version,
                  version,
                  tenant_id,
                  updated_at,
                  payload: map })
    }

    /// Documento plano listo para persistir (claves reservadas al nivel
    /// superior junto al payload).
    pub fn to_document(&self) -> Value {
        self.clone().into_document()
    }

    pub fn into_document(self) -> Value {
        let mut map = self.payload;
        map.insert(SCHEMA_VERSION_KEY.to_string(), Value::String(self.schema_version));
        map.insert(VERSION_KEY.to_string(), Value::from(self.version));
        map.insert(TENANT_ID_KEY.to_string(),
                   self.tenant_id.map(Value::String).unwrap_or(Value::Null));
        if let Some(ts) = self.updated_at {
            map.insert(UPDATED_AT_KEY.to_string(),
                       Value::String(ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)));
        }
        Value::Object(map)
    }
}

impl Serialize for DialogueState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DialogueState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = Value::deserialize(deserializer)?;
        Self::from_document(doc).map_err(serde::de::Error::custom)
    }
}

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// `_version` válido: entero no negativo o string con dígitos.
pub(crate) fn parse_version(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
