//! Traducción de `StateStoreError` a la respuesta que ve el usuario.

use dds_core::StateStoreError;
use serde::Serialize;

pub const CONFLICT_MESSAGE: &str = "Your changes conflicted with another update, please retry.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApiOutcome {
    /// El llamador debe recargar, re-aplicar su cambio y reintentar.
    Conflict { message: String, current_version: u64, attempted_version: u64 },
    InvalidState { errors: Vec<String> },
    NotFound { thread_id: String },
    Unavailable { message: String },
}

impl ApiOutcome {
    pub fn from_error(err: &StateStoreError) -> Self {
        match err {
            StateStoreError::ConcurrencyConflict { current_version,
                                                   attempted_version, } => {
                Self::Conflict { message: CONFLICT_MESSAGE.to_string(),
                                 current_version: *current_version,
                                 attempted_version: *attempted_version }
            }
            StateStoreError::Schema { errors } => Self::InvalidState { errors: errors.clone() },
            StateStoreError::ThreadNotFound { thread_id } => Self::NotFound { thread_id: thread_id.clone() },
            // el detalle por backend queda en los logs
            StateStoreError::StorageUnavailable { .. } => {
                Self::Unavailable { message: "State storage is temporarily unavailable.".to_string() }
            }
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Conflict { .. } => 409,
            Self::InvalidState { .. } => 422,
            Self::NotFound { .. } => 404,
            Self::Unavailable { .. } => 503,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<&StateStoreError> for ApiOutcome {
    fn from(err: &StateStoreError) -> Self {
        Self::from_error(err)
    }
}
