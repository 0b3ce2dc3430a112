//! Validación mínima de forma del estado candidato.
//!
//! Contrato intencionalmente pequeño: sólo se rechaza (error) lo que no es un
//! documento JSON. Las verificaciones de forma compatibles hacia adelante se
//! emiten como warnings no bloqueantes. Nunca muta la entrada.

use serde_json::Value;

use crate::constants::{CURRENT_SCHEMA_VERSION, MAX_VERSION, SCHEMA_VERSION_KEY, TENANT_ID_KEY, UPDATED_AT_KEY,
                       VERSION_KEY};
use crate::state::{json_kind, parse_version};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn validate(candidate: &Value) -> ValidationReport {
    let map = match candidate {
        Value::Object(map) => map,
        other => {
            return ValidationReport { valid: false,
                                      errors: vec![format!("state must be a JSON object, got {}", json_kind(other))],
                                      warnings: vec![] }
        }
    };

    let mut warnings = Vec::new();
    let mut errors = Vec::new();
    match map.get(SCHEMA_VERSION_KEY) {
        None => {}
        Some(Value::String(s)) => match parse_semver(s) {
            None => warnings.push(format!("{SCHEMA_VERSION_KEY} `{s}` is not MAJOR.MINOR.PATCH")),
            Some((major, _, _)) => {
                let current_major = parse_semver(CURRENT_SCHEMA_VERSION).map(|v| v.0).unwrap_or(0);
                if major > current_major {
                    warnings.push(format!("{SCHEMA_VERSION_KEY} `{s}` is newer than supported {CURRENT_SCHEMA_VERSION}"));
                }
            }
        },
        Some(other) => warnings.push(format!("{SCHEMA_VERSION_KEY} should be a string, got {}", json_kind(other))),
    }
    if let Some(v) = map.get(VERSION_KEY) {
        match parse_version(v) {
            Some(n) if n > MAX_VERSION => errors.push(format!("{VERSION_KEY} {n} exceeds the maximum version {MAX_VERSION}")),
            None if !v.is_null() => warnings.push(format!("{VERSION_KEY} should be a non-negative integer, got {v}; ignored")),
            _ => {}
        }
    }
    if let Some(v) = map.get(TENANT_ID_KEY) {
        if !(v.is_null() || v.is_string()) {
            warnings.push(format!("{TENANT_ID_KEY} should be a string or null, got {}; ignored", json_kind(v)));
        }
    }
    if let Some(v) = map.get(UPDATED_AT_KEY) {
        if !(v.is_null() || v.is_string()) {
            warnings.push(format!("{UPDATED_AT_KEY} should be a string, got {}", json_kind(v)));
        }
    }

    ValidationReport { valid: errors.is_empty(),
                       errors,
                       warnings }
}

fn parse_semver(s: &str) -> Option<(u64, u64, u64)> {
    let mut parts = s.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}
