//! dds-core: store de estado de diálogo con concurrencia optimista.
//!
//! Núcleo independiente de la base de datos:
//! - `state`: envelope tipado (`DialogueState`) sobre un payload JSON opaco.
//! - `validate`: validación mínima de forma del candidato.
//! - `version`: estampado de versión y predicado de escritura condicional.
//! - `backend`: contrato `StateBackend` de la cadena de fallback + cache en memoria.
//! - `store`: fachada `load` / `save` que recorre la cadena.
pub mod backend;
pub mod clock;
pub mod constants;
pub mod errors;
pub mod state;
pub mod store;
pub mod validate;
pub mod version;

pub use backend::{InMemoryStateCache, StateBackend, WriteGuarantee};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{AttemptFailure, BackendError, StateStoreError};
pub use state::{DialogueState, StateDecodeError, ThreadId};
pub use store::{SaveOutcome, StateStore, StateStoreBuilder};
pub use validate::{validate, ValidationReport};
pub use version::{stamp, StampedWrite, WriteCondition};
