//! Estrategias de persistencia de la cadena de fallback.
//!
//! Cada backend expone la misma interfaz (`load` / `attempt_save`) y el
//! coordinador (`StateStore`) los recorre en orden hasta que uno responde.
//! El orden y la condición de agotamiento viven en una lista explícita, no en
//! flujo de control anidado.

mod memory;

pub use memory::InMemoryStateCache;

use crate::errors::BackendError;
use crate::state::{DialogueState, ThreadId};
use crate::version::StampedWrite;

/// Garantía de orden que ofrece un backend al escribir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuarantee {
    /// La base de datos aplica el predicado de versión (UPDATE condicional).
    Conditional,
    /// Read-merge-write sin predicado atómico; orden best-effort.
    BestEffort,
    /// Sólo dentro del proceso, no persistente.
    ProcessLocal,
}

/// Contrato uniforme de una estrategia de la cadena.
///
/// - `Skipped` indica que el backend no aplica (se pasa al siguiente sin
///   registrar una falla).
/// - `Conflict` / `ThreadNotFound` son terminales: el coordinador los propaga.
/// - `Timeout` / `Unavailable` se registran y se absorben.
///
/// Cada implementación acota su propia latencia (timeouts de conexión,
/// statement o request) para que un cuelgue no bloquee el fallthrough.
pub trait StateBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn guarantee(&self) -> WriteGuarantee;
    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError>;

    /// Lectura bajo el tenant de la sesión. Los backends con seguridad por fila
    /// la sirven dentro del mismo contexto de tenant que usan para escribir,
    /// así la versión base de un `save` es la que el UPDATE condicional ve.
    fn load_scoped(&self, thread_id: &ThreadId, _tenant: Option<&str>) -> Result<Option<DialogueState>, BackendError> {
        self.load(thread_id)
    }
    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError>;
}
