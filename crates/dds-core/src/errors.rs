//! Errores del store de estado.
//!
//! Dos niveles:
//! - `StateStoreError`: lo que ve el llamador de `load`/`save`.
//! - `BackendError`: lo que devuelve cada estrategia de la cadena de fallback.
//!   El coordinador decide qué variantes se absorben (se registra y se pasa al
//!   siguiente backend) y cuáles se propagan sin cambios.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Intento fallido de un backend, acumulado cuando toda la cadena se agota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub backend: &'static str,
    pub reason: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.backend, self.reason)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateStoreError {
    #[error("invalid state schema: {}", .errors.join(", "))]
    Schema { errors: Vec<String> },
    #[error("state version conflict: believed current version {current_version}, attempted {attempted_version}")]
    ConcurrencyConflict { current_version: u64, attempted_version: u64 },
    #[error("thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },
    #[error("storage unavailable: {}", join_attempts(.attempts))]
    StorageUnavailable { attempts: Vec<AttemptFailure> },
}

impl StateStoreError {
    /// Sólo un conflicto de versión se resuelve recargando y reintentando; la
    /// política de reintento es del llamador.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

fn join_attempts(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no backend configured".to_string();
    }
    attempts.iter().map(|a| a.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// El backend no aplica a esta operación (sin tenant, sin lectura, etc.).
    #[error("skipped: {0}")]
    Skipped(String),
    #[error("version conflict (current {current_version}, attempted {attempted_version})")]
    Conflict { current_version: u64, attempted_version: u64 },
    #[error("thread not found")]
    ThreadNotFound,
    #[error("timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Variantes que detienen la cadena y llegan al llamador sin fallthrough.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::ThreadNotFound)
    }
}
