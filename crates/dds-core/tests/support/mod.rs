//! Backends falsos para simular cortes y carreras sin base de datos.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

use dds_core::{BackendError, DialogueState, StampedWrite, StateBackend, ThreadId, WriteGuarantee};

/// Simula un UPDATE condicional: aplica `WriteCondition::admits` bajo lock,
/// igual que la base de datos evalúa el WHERE sobre la fila.
#[derive(Clone, Default)]
pub struct ConditionalTable {
    rows: Arc<Mutex<HashMap<ThreadId, DialogueState>>>,
    pub writes: Arc<AtomicUsize>,
}

impl ConditionalTable {
    pub fn stored_version(&self, thread_id: &ThreadId) -> Option<u64> {
        self.rows.lock().unwrap().get(thread_id).map(|s| s.version)
    }
}

impl StateBackend for ConditionalTable {
    fn name(&self) -> &'static str {
        "conditional-fake"
    }
    fn guarantee(&self) -> WriteGuarantee {
        WriteGuarantee::Conditional
    }
    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        Ok(self.rows.lock().unwrap().get(thread_id).cloned())
    }
    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError> {
        let mut rows = self.rows.lock().unwrap();
        let stored = rows.get(&write.thread_id).map(|s| s.version);
        if !write.condition.admits(stored) {
            return Err(write.condition.conflict());
        }
        rows.insert(write.thread_id.clone(), write.state.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Backend que siempre falla con el error configurado y cuenta intentos.
pub struct Failing {
    pub name: &'static str,
    pub error: BackendError,
    pub loads: Arc<AtomicUsize>,
    pub saves: Arc<AtomicUsize>,
}

impl Failing {
    pub fn new(name: &'static str, error: BackendError) -> Self {
        Self { name,
               error,
               loads: Arc::new(AtomicUsize::new(0)),
               saves: Arc::new(AtomicUsize::new(0)) }
    }
}

impl StateBackend for Failing {
    fn name(&self) -> &'static str {
        self.name
    }
    fn guarantee(&self) -> WriteGuarantee {
        WriteGuarantee::Conditional
    }
    fn load(&self, _thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
    fn attempt_save(&self, _write: &StampedWrite) -> Result<(), BackendError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Envuelve un backend; una vez armado obliga a que `parties` escritores
/// lleguen a `attempt_save` antes de que cualquiera escriba, así todos
/// estampan sobre la misma versión base.
pub struct Gated<B> {
    pub inner: B,
    barrier: Mutex<Option<Arc<Barrier>>>,
}

impl<B> Gated<B> {
    pub fn new(inner: B) -> Self {
        Self { inner,
               barrier: Mutex::new(None) }
    }

    pub fn arm(&self, parties: usize) {
        *self.barrier.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }
}

impl<B: StateBackend> StateBackend for Gated<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }
    fn guarantee(&self) -> WriteGuarantee {
        self.inner.guarantee()
    }
    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        self.inner.load(thread_id)
    }
    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError> {
        let barrier = self.barrier.lock().unwrap().clone();
        if let Some(b) = barrier {
            b.wait();
        }
        self.inner.attempt_save(write)
    }
}
