//! Camino gestionado: cliente sin contexto de tenant (service role).
//!
//! Lee `metadata` completo del thread, reemplaza sólo `dds_state` y vuelve a
//! escribir el objeto entero. No hay predicado de versión en la base: entre la
//! lectura y la escritura otro escritor puede colarse. El chequeo previo sólo
//! rechaza escrituras que ya se saben rancias.
//!
//! El service role no está sujeto a RLS, así que el aislamiento por tenant se
//! aplica acá: un estado firmado por otro `_tenant_id` no se lee ni se pisa
//! desde una sesión con tenant.
//!
//! Implementaciones:
//! - `RestManagedClient`: PostgREST / Supabase sobre `reqwest::blocking`.
//! - `PgManagedClient`: lectura/escritura puntual con Diesel (sólo `DATABASE_URL`).

pub mod pg;
pub mod rest;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dds_core::constants::STATE_FIELD;
use dds_core::{BackendError, DialogueState, StampedWrite, StateBackend, ThreadId, WriteGuarantee};
use log::{debug, info};
use serde_json::{Map, Value};

use crate::document::{owned_by_other_tenant, state_from_metadata};
use crate::error::PersistenceError;

pub use pg::PgManagedClient;
pub use rest::RestManagedClient;

/// Contrato mínimo de un cliente gestionado sobre `chat_threads.metadata`.
///
/// - `fetch_metadata`: `Err(NotFound)` si la fila no existe; `Ok(None)` si
///   `metadata` es null.
/// - `update_metadata`: reemplaza `metadata` completo; `Err(NotFound)` si
///   ninguna fila coincidió.
pub trait ManagedClient: Send + Sync + 'static {
    fn fetch_metadata(&self, thread_id: &ThreadId) -> Result<Option<Map<String, Value>>, PersistenceError>;

    fn update_metadata(&self, thread_id: &ThreadId, metadata: &Map<String, Value>) -> Result<(), PersistenceError>;

    /// Presupuesto de tiempo de cada petición (para reportar timeouts).
    fn request_timeout(&self) -> Duration;
}

pub struct ManagedBackend<C: ManagedClient> {
    pub client: C,
    guarantee_logged: AtomicBool,
}

impl<C: ManagedClient> ManagedBackend<C> {
    pub fn new(client: C) -> Self {
        Self { client,
               guarantee_logged: AtomicBool::new(false) }
    }

    fn fail(&self, err: PersistenceError) -> BackendError {
        err.into_backend(self.client.request_timeout())
    }
}

impl<C: ManagedClient> StateBackend for ManagedBackend<C> {
    fn name(&self) -> &'static str {
        "managed"
    }

    fn guarantee(&self) -> WriteGuarantee {
        WriteGuarantee::BestEffort
    }

    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        match self.client.fetch_metadata(thread_id) {
            Ok(metadata) => state_from_metadata(metadata.as_ref()).map_err(|e| self.fail(e)),
            // sin fila no hay estado; crear threads no es responsabilidad del store
            Err(PersistenceError::NotFound) => Ok(None),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn load_scoped(&self, thread_id: &ThreadId, tenant: Option<&str>) -> Result<Option<DialogueState>, BackendError> {
        Ok(self.load(thread_id)?.filter(|state| !owned_by_other_tenant(state, tenant)))
    }

    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError> {
        if !self.guarantee_logged.swap(true, Ordering::Relaxed) {
            info!("managed path writes without a version predicate; concurrent writers may overwrite each other");
        }
        let mut metadata = self.client
                               .fetch_metadata(&write.thread_id)
                               .map_err(|e| self.fail(e))?
                               .unwrap_or_default();
        let stored = match state_from_metadata(Some(&metadata)) {
            Ok(Some(state)) if owned_by_other_tenant(&state, write.tenant.as_deref()) => {
                debug!("managed:foreign-tenant thread_id={} stored={:?}", write.thread_id, state.tenant_id);
                return Err(BackendError::ThreadNotFound);
            }
            Ok(state) => state.map(|s| s.version),
            // un documento ilegible se sobrescribe
            Err(e) => {
                debug!("managed:overwrite undecodable state thread_id={} err={e}", write.thread_id);
                None
            }
        };
        if !write.condition.admits(stored) {
            return Err(write.condition.conflict());
        }
        metadata.insert(STATE_FIELD.to_string(), write.state.to_document());
        self.client
            .update_metadata(&write.thread_id, &metadata)
            .map_err(|e| self.fail(e))
    }
}
