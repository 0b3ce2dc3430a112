//! `StateStore`: fachada `load`/`save` y coordinador de la cadena de fallback.
//!
//! Flujo de `save`:
//! 1. Validación de forma (errores => `Schema`, sin escritura).
//! 2. Lectura del estado vigente bajo el mismo tenant (`load_scoped`).
//! 3. Estampado de versión y metadatos (`version::stamp`).
//! 4. Recorrido ordenado de backends con `attempt_save` hasta el primer éxito.
//!
//! Política de errores durante el recorrido:
//! - `Conflict` y `ThreadNotFound` se propagan de inmediato; nunca se
//!   reintenta ni se cae al siguiente backend (suprimir un conflicto
//!   reintroduce el lost update).
//! - `Skipped` pasa al siguiente sin contar como falla.
//! - `Timeout` / `Unavailable` se registran con `warn!` y se absorben.
//! - Agotada la cadena: `StorageUnavailable` con cada intento fallido.
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde_json::Value;

use crate::backend::{InMemoryStateCache, StateBackend, WriteGuarantee};
use crate::clock::{Clock, SystemClock};
use crate::errors::{AttemptFailure, BackendError, StateStoreError};
use crate::state::{DialogueState, ThreadId};
use crate::validate::validate;
use crate::version::stamp;

/// Resultado de un `save` exitoso.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub version: u64,
    /// Backend que persistió finalmente el documento.
    pub backend: &'static str,
    pub guarantee: WriteGuarantee,
}

pub struct StateStore {
    backends: Vec<Arc<dyn StateBackend>>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    pub fn builder() -> StateStoreBuilder {
        StateStoreBuilder::default()
    }

    /// Store sólo en memoria (desarrollo/tests). El cache queda accesible vía
    /// el clon que se pase.
    pub fn in_memory(cache: InMemoryStateCache) -> Self {
        Self::builder().backend(cache).build()
    }

    /// Nombres de los backends en el orden en que se intentan.
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Carga el estado de un thread. `Ok(None)` = nunca inicializado (distinto
    /// de un documento con payload vacío).
    pub fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, StateStoreError> {
        self.load_scoped(thread_id, None)
    }

    /// Carga bajo el tenant de la sesión (RLS en el camino directo).
    ///
    /// El primer backend que responde, con estado o sin él, es autoritativo:
    /// los siguientes sólo se consultan si los anteriores fallaron, de modo
    /// que una entrada vieja del cache en memoria no tapa a la base.
    pub fn load_scoped(&self, thread_id: &ThreadId, tenant: Option<&str>) -> Result<Option<DialogueState>, StateStoreError> {
        let tenant = tenant.filter(|t| !t.trim().is_empty());
        let mut failures = Vec::new();
        for backend in &self.backends {
            match backend.load_scoped(thread_id, tenant) {
                Ok(found) => {
                    debug!("load:answer thread_id={thread_id} backend={} version={:?}",
                           backend.name(),
                           found.as_ref().map(|s| s.version));
                    return Ok(found);
                }
                Err(BackendError::Skipped(reason)) => {
                    debug!("load:skip thread_id={thread_id} backend={} reason={reason}", backend.name());
                }
                Err(e) => {
                    warn!("load:fallthrough thread_id={thread_id} backend={} err={e}", backend.name());
                    failures.push(AttemptFailure { backend: backend.name(),
                                                   reason: e.to_string() });
                }
            }
        }
        Err(StateStoreError::StorageUnavailable { attempts: failures })
    }

    /// Guarda un estado candidato para el thread.
    ///
    /// `tenant` (opcional) acota la sesión de base de datos para RLS y se
    /// refleja en `_tenant_id`. Devuelve la versión escrita y el backend que la
    /// persistió.
    pub fn save(&self, thread_id: &ThreadId, candidate: Value, tenant: Option<&str>) -> Result<SaveOutcome, StateStoreError> {
        let report = validate(&candidate);
        if !report.valid {
            return Err(StateStoreError::Schema { errors: report.errors });
        }
        if !report.warnings.is_empty() {
            warn!("save:schema warnings thread_id={thread_id}: {}", report.warnings.join(", "));
        }
        let candidate = match candidate {
            Value::Object(map) => map,
            _ => return Err(StateStoreError::Schema { errors: vec!["state must be a JSON object".into()] }),
        };

        let previous = self.load_scoped(thread_id, tenant)?;
        let write = stamp(thread_id, previous.as_ref(), &candidate, tenant, self.clock.now())?;
        debug!("save:start thread_id={thread_id} believed={} attempting={} tenant={:?}",
               write.condition.believed_version,
               write.condition.new_version,
               write.tenant);

        let mut failures = Vec::new();
        for backend in &self.backends {
            let started = Instant::now();
            match backend.attempt_save(&write) {
                Ok(()) => {
                    let guarantee = backend.guarantee();
                    if guarantee != WriteGuarantee::Conditional {
                        info!("save:done thread_id={thread_id} version={} backend={} guarantee={guarantee:?} (no database-level version predicate)",
                              write.state.version,
                              backend.name());
                    } else {
                        debug!("save:done thread_id={thread_id} version={} backend={}",
                               write.state.version,
                               backend.name());
                    }
                    return Ok(SaveOutcome { version: write.state.version,
                                            backend: backend.name(),
                                            guarantee });
                }
                Err(BackendError::Conflict { current_version,
                                             attempted_version, }) => {
                    warn!("save:conflict thread_id={thread_id} backend={} current={current_version} attempted={attempted_version}",
                          backend.name());
                    return Err(StateStoreError::ConcurrencyConflict { current_version,
                                                                      attempted_version });
                }
                Err(BackendError::ThreadNotFound) => {
                    return Err(StateStoreError::ThreadNotFound { thread_id: thread_id.to_string() });
                }
                Err(BackendError::Skipped(reason)) => {
                    debug!("save:skip thread_id={thread_id} backend={} reason={reason}", backend.name());
                }
                Err(e) => {
                    warn!("save:fallthrough thread_id={thread_id} backend={} elapsed_ms={} err={e}",
                          backend.name(),
                          started.elapsed().as_millis());
                    failures.push(AttemptFailure { backend: backend.name(),
                                                   reason: e.to_string() });
                }
            }
        }
        Err(StateStoreError::StorageUnavailable { attempts: failures })
    }
}

/// Builder de `StateStore`: el orden de `backend(..)` es el orden de la cadena.
#[derive(Default)]
pub struct StateStoreBuilder {
    backends: Vec<Arc<dyn StateBackend>>,
    clock: Option<Arc<dyn Clock>>,
}

impl StateStoreBuilder {
    pub fn backend<B: StateBackend + 'static>(mut self, backend: B) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    pub fn shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> StateStore {
        StateStore { backends: self.backends,
                     clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn never_written_thread_is_none_and_empty_payload_is_some() {
        let store = StateStore::in_memory(InMemoryStateCache::new());
        let fresh: ThreadId = "fresh".into();
        assert_eq!(store.load(&fresh).unwrap(), None);

        let empty: ThreadId = "empty".into();
        store.save(&empty, json!({}), None).unwrap();
        let loaded = store.load(&empty).unwrap().expect("estado presente");
        assert!(loaded.payload.is_empty());
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn schema_errors_prevent_any_write() {
        let cache = InMemoryStateCache::new();
        let store = StateStore::in_memory(cache.clone());
        let t: ThreadId = "t".into();
        for bad in [json!(null), json!(42)] {
            let err = store.save(&t, bad, None).unwrap_err();
            assert!(matches!(err, StateStoreError::Schema { .. }), "{err:?}");
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn version_overflow_is_rejected_without_panicking() {
        let cache = InMemoryStateCache::new();
        let store = StateStore::in_memory(cache.clone());
        let t: ThreadId = "overflow".into();
        let err = store.save(&t, json!({"_version": u64::MAX}), None).unwrap_err();
        assert!(matches!(err, StateStoreError::Schema { .. }), "{err:?}");
        assert!(cache.is_empty());

        let top = crate::constants::MAX_VERSION;
        assert_eq!(store.save(&t, json!({"_version": top}), None).unwrap().version, top);
        let err = store.save(&t, json!({"x": 1}), None).unwrap_err();
        assert!(matches!(err, StateStoreError::Schema { .. }), "{err:?}");
        assert_eq!(store.load(&t).unwrap().unwrap().version, top);
    }

    #[test]
    fn empty_chain_is_storage_unavailable() {
        let store = StateStore::builder().build();
        assert!(store.backend_names().is_empty());
        let err = store.load(&"x".into()).unwrap_err();
        assert!(matches!(err, StateStoreError::StorageUnavailable { .. }));
    }
}
