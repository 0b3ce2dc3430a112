//! Errores de persistencia.
//! Mapea errores de Diesel / pool / HTTP a variantes semánticas y, en el borde
//! de la cadena de fallback, a `BackendError` del core.

use std::time::Duration;

use dds_core::BackendError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict (retryable)")]
    SerializationConflict,
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("transient IO / connection pool error: {0}")]
    TransientIo(String),
    #[error("tenant id is required for tenant-scoped writes")]
    MissingTenant,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("managed client HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl PersistenceError {
    /// Traduce al contrato de la cadena. `budget` es el timeout configurado
    /// del intento que falló (para reportar `Timeout { after }`).
    pub fn into_backend(self, budget: Duration) -> BackendError {
        match self {
            Self::NotFound => BackendError::ThreadNotFound,
            Self::Timeout(_) => BackendError::Timeout { after: budget },
            Self::MissingTenant => BackendError::Skipped("no tenant supplied".into()),
            other => BackendError::Unavailable(other.to_string()),
        }
    }
}

/// Mensajes de Postgres/r2d2 que indican que se agotó el presupuesto de
/// tiempo (statement_timeout, lock_timeout o checkout del pool).
pub(crate) fn looks_like_timeout(msg: &str) -> bool {
    let m = msg.to_lowercase();
    m.contains("statement timeout") || m.contains("lock timeout") || m.contains("timed out")
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::TransientIo(info.message().to_string()),
                // diesel no tiene variante propia para 40P01; se reintenta igual que 40001
                _ if info.message().contains("deadlock detected") => Self::SerializationConflict,
                _ if looks_like_timeout(info.message()) => Self::Timeout(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Decode(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::BrokenTransactionManager => Self::TransientIo("broken transaction manager".into()),
            DieselError::RollbackErrorOnCommit { rollback_error, commit_error } => {
                Self::Unknown(format!("rollback={rollback_error}; commit={commit_error}"))
            }
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<r2d2::Error> for PersistenceError {
    fn from(err: r2d2::Error) -> Self {
        let msg = err.to_string();
        if looks_like_timeout(&msg) {
            Self::Timeout(format!("pool checkout: {msg}"))
        } else {
            Self::TransientIo(format!("pool error: {msg}"))
        }
    }
}

impl From<reqwest::Error> for PersistenceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("managed request: {err}"))
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::TransientIo(format!("managed request: {err}"))
        }
    }
}
