//! dds-store
//!
//! Punto de entrada del store de estado de diálogo:
//! - `wiring`: arma la cadena directo -> gestionado -> memoria desde el entorno.
//! - `outcome`: traduce errores del store a respuestas para el usuario.
//!
//! Re-exporta la fachada de `dds-core` para que los llamadores dependan de un
//! solo crate.

pub mod outcome;
pub mod wiring;

pub use dds_core::{DialogueState, InMemoryStateCache, SaveOutcome, StateStore, StateStoreError, ThreadId,
                   WriteGuarantee};
pub use outcome::ApiOutcome;
pub use wiring::{build_store, build_store_from_env, ChainConfig};
