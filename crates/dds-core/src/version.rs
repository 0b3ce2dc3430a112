//! Control de versiones y detección de conflictos (concurrencia optimista).
//!
//! Dado el último estado cargado (o su ausencia) y el candidato, calcula la
//! versión a escribir, estampa los metadatos reservados y produce el predicado
//! condicional que la capa de almacenamiento usa para rechazar la escritura
//! si otro escritor ya avanzó la versión.
//!
//! Reglas respecto al `_version` que trae el candidato (`base`):
//! - `base > current`: el llamador ya resolvió un merge; se usa tal cual.
//! - `base == current` o ausente: se escribe `current + 1`.
//! - `base < current`: escritura rancia; conflicto (nunca se corrige hacia arriba).
//!
//! Ninguna versión supera `MAX_VERSION` (rango de `bigint`); agotado el rango
//! el thread ya no admite escrituras y `stamp` devuelve `Schema`.
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::constants::{CURRENT_SCHEMA_VERSION, MAX_VERSION, SCHEMA_VERSION_KEY, TENANT_ID_KEY, VERSION_KEY};
use crate::errors::{BackendError, StateStoreError};
use crate::state::{is_reserved, parse_version, DialogueState, ThreadId};

/// Predicado de escritura condicional: `stored IS NULL OR stored < new_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteCondition {
    /// Versión que el escritor cree vigente (la que reporta un conflicto).
    pub believed_version: u64,
    pub new_version: u64,
}

impl WriteCondition {
    pub fn admits(&self, stored: Option<u64>) -> bool {
        match stored {
            None => true,
            Some(v) => v < self.new_version,
        }
    }

    pub fn conflict(&self) -> BackendError {
        BackendError::Conflict { current_version: self.believed_version,
                                 attempted_version: self.new_version }
    }
}

/// Escritura lista para cualquier backend: estado estampado + predicado.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedWrite {
    pub thread_id: ThreadId,
    pub state: DialogueState,
    pub condition: WriteCondition,
    /// Tenant de la sesión (sólo para RLS); ya reflejado en `state.tenant_id`.
    pub tenant: Option<String>,
}

pub fn stamp(thread_id: &ThreadId,
             previous: Option<&DialogueState>,
             candidate: &Map<String, Value>,
             tenant: Option<&str>,
             now: DateTime<Utc>)
             -> Result<StampedWrite, StateStoreError> {
    let current = previous.map(|p| p.version).unwrap_or(0);
    let base = candidate.get(VERSION_KEY).and_then(parse_version);

    let new_version = match base {
        Some(b) if b > MAX_VERSION => return Err(version_out_of_range(b)),
        Some(b) if b > current => b,
        Some(b) if b < current => {
            return Err(StateStoreError::ConcurrencyConflict { current_version: b,
                                                              attempted_version: b + 1 })
        }
        _ => current.checked_add(1)
                    .filter(|v| *v <= MAX_VERSION)
                    .ok_or_else(|| version_out_of_range(current))?,
    };

    let schema_version = match candidate.get(SCHEMA_VERSION_KEY) {
        Some(Value::String(s)) => s.clone(),
        _ => CURRENT_SCHEMA_VERSION.to_string(),
    };

    let session_tenant = non_empty(tenant);
    let candidate_tenant = match candidate.get(TENANT_ID_KEY) {
        Some(Value::String(s)) => non_empty(Some(s.as_str())),
        _ => None,
    };
    let tenant_id = session_tenant.or(candidate_tenant)
                                  .map(str::to_string)
                                  .or_else(|| previous.and_then(|p| p.tenant_id.clone()));

    let payload: Map<String, Value> = candidate.iter()
                                               .filter(|(k, _)| !is_reserved(k))
                                               .map(|(k, v)| (k.clone(), v.clone()))
                                               .collect();

    Ok(StampedWrite { thread_id: thread_id.clone(),
                      state: DialogueState { schema_version,
                                             version: new_version,
                                             tenant_id,
                                             updated_at: Some(now),
                                             payload },
                      condition: WriteCondition { believed_version: current,
                                                  new_version },
                      tenant: session_tenant.map(str::to_string) })
}

fn version_out_of_range(v: u64) -> StateStoreError {
    StateStoreError::Schema { errors: vec![format!("{VERSION_KEY} {v} leaves no room below the maximum version {MAX_VERSION}")] }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
