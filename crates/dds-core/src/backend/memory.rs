use std::sync::Arc;

use dashmap::DashMap;

use super::{StateBackend, WriteGuarantee};
use crate::errors::BackendError;
use crate::state::{DialogueState, ThreadId};
use crate::version::StampedWrite;

/// Cache en proceso: último eslabón de la cadena.
///
/// No persistente y no compartido entre procesos; existe para desarrollo
/// local y tests. Se construye explícitamente y se inyecta (clonarlo comparte
/// el mismo mapa), de modo que cada store de test tiene su propio estado.
/// Último escritor gana: no aplica el predicado de versión.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateCache {
    inner: Arc<DashMap<ThreadId, DialogueState>>,
}

impl InMemoryStateCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
    pub fn clear(&self) {
        self.inner.clear()
    }
    pub fn remove(&self, thread_id: &ThreadId) -> Option<DialogueState> {
        self.inner.remove(thread_id).map(|(_, v)| v)
    }
}

impl StateBackend for InMemoryStateCache {
    fn name(&self) -> &'static str {
        "in-memory"
    }
    fn guarantee(&self) -> WriteGuarantee {
        WriteGuarantee::ProcessLocal
    }
    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        Ok(self.inner.get(thread_id).map(|e| e.value().clone()))
    }
    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError> {
        self.inner.insert(write.thread_id.clone(), write.state.clone());
        Ok(())
    }
}
