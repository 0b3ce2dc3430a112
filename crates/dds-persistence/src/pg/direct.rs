//! Camino directo: conexión Postgres propia, contexto de tenant y UPDATE
//! condicional sobre la versión.
//!
//! La escritura reemplaza sólo `metadata.dds_state` (`jsonb_set`), dejando
//! intactas las claves hermanas de `metadata`. El predicado de versión vive en
//! la cláusula `WHERE`, así que el chequeo y la escritura son un único paso
//! atómico en la base: de dos escritores con la misma base gana uno solo.
//!
//! Cuando el UPDATE no afecta filas se distingue, dentro de la misma
//! transacción y bajo el mismo contexto de tenant:
//! - fila visible => otro escritor avanzó la versión (`Conflict`);
//! - fila no visible => thread inexistente o fuera del tenant
//!   (`ThreadNotFound`, terminal: ningún backend posterior escribe una fila que
//!   RLS oculta a la sesión).
//!
//! Las lecturas con tenant corren bajo el mismo contexto, así la versión base
//! de un `save` es la misma que evalúa el UPDATE.

use std::time::Duration;

use dds_core::constants::{STATE_FIELD, VERSION_KEY};
use dds_core::{BackendError, DialogueState, StampedWrite, StateBackend, ThreadId, WriteGuarantee};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Jsonb, Text};
use log::debug;

use super::{with_tenant_context, ConnectionProvider, PoolProvider};
use crate::config::DbConfig;
use crate::document::state_from_column;
use crate::error::PersistenceError;
use crate::schema::chat_threads;

/// Resultado de un intento de UPDATE condicional.
#[derive(Debug, PartialEq, Eq)]
enum DirectWrite {
    Applied,
    Stale,
    NotVisible,
}

pub struct PgDirectBackend<P: ConnectionProvider = PoolProvider> {
    pub provider: P,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl<P: ConnectionProvider> PgDirectBackend<P> {
    pub fn new(provider: P, cfg: &DbConfig) -> Self {
        Self { provider,
               connect_timeout: cfg.connect_timeout,
               statement_timeout: cfg.statement_timeout }
    }

    /// Presupuesto del intento que falló: checkout del pool o sentencia.
    fn budget_for(&self, err: &PersistenceError) -> Duration {
        match err {
            PersistenceError::Timeout(msg) if msg.starts_with("pool checkout") => self.connect_timeout,
            _ => self.statement_timeout,
        }
    }

    fn scoped_read(&self, tenant: &str, thread_id: &ThreadId) -> Result<Option<DialogueState>, PersistenceError> {
        let column = with_tenant_context(&self.provider, tenant, self.statement_timeout, |tx| {
                         Ok(chat_threads::table.filter(chat_threads::id.eq(thread_id.as_str()))
                                               .select(chat_threads::metadata)
                                               .first::<Option<serde_json::Value>>(tx)
                                               .optional()?)
                     })?;
        state_from_column(column.flatten())
    }

    fn conditional_update(&self, tenant: &str, write: &StampedWrite) -> Result<DirectWrite, PersistenceError> {
        let document = write.state.to_document();
        let new_version = i64::try_from(write.condition.new_version).map_err(|_| {
                                            PersistenceError::CheckViolation(format!("version {} exceeds bigint",
                                                                                     write.condition.new_version))
                                        })?;
        let thread_id = write.thread_id.as_str();
        with_tenant_context(&self.provider, tenant, self.statement_timeout, |tx| {
            let affected = diesel::sql_query(conditional_update_sql()).bind::<Jsonb, _>(&document)
                                                                      .bind::<Text, _>(thread_id)
                                                                      .bind::<BigInt, _>(new_version)
                                                                      .execute(tx)?;
            if affected > 0 {
                return Ok(DirectWrite::Applied);
            }
            let visible = chat_threads::table.filter(chat_threads::id.eq(thread_id))
                                             .select(chat_threads::id)
                                             .first::<String>(tx)
                                             .optional()?;
            Ok(if visible.is_some() {
                   DirectWrite::Stale
               } else {
                   DirectWrite::NotVisible
               })
        })
    }
}

/// `UPDATE` condicional: `$1` documento, `$2` id del thread, `$3` versión nueva.
fn conditional_update_sql() -> String {
    let stored = format!("(metadata -> '{STATE_FIELD}' ->> '{VERSION_KEY}')");
    format!("UPDATE chat_threads \
             SET metadata = jsonb_set(COALESCE(metadata, '{{}}'::jsonb), '{{{STATE_FIELD}}}', $1), \
                 updated_at = now() \
             WHERE id = $2 AND ({stored} IS NULL OR {stored}::bigint < $3)")
}

impl<P: ConnectionProvider> StateBackend for PgDirectBackend<P> {
    fn name(&self) -> &'static str {
        "pg-direct"
    }

    fn guarantee(&self) -> WriteGuarantee {
        WriteGuarantee::Conditional
    }

    fn load(&self, thread_id: &ThreadId) -> Result<Option<DialogueState>, BackendError> {
        self.load_scoped(thread_id, None)
    }

    /// Sin tenant no hay contexto RLS: la lectura queda para el cliente
    /// gestionado. Una fila invisible bajo el tenant se lee como `None`.
    fn load_scoped(&self, thread_id: &ThreadId, tenant: Option<&str>) -> Result<Option<DialogueState>, BackendError> {
        let Some(tenant) = tenant else {
            return Err(BackendError::Skipped("no tenant supplied".into()));
        };
        self.scoped_read(tenant, thread_id).map_err(|e| {
                                               let budget = self.budget_for(&e);
                                               e.into_backend(budget)
                                           })
    }

    fn attempt_save(&self, write: &StampedWrite) -> Result<(), BackendError> {
        let Some(tenant) = write.tenant.as_deref() else {
            return Err(BackendError::Skipped("no tenant supplied".into()));
        };
        match self.conditional_update(tenant, write) {
            Ok(DirectWrite::Applied) => {
                debug!("pg-direct:applied thread_id={} version={}",
                       write.thread_id, write.condition.new_version);
                Ok(())
            }
            Ok(DirectWrite::Stale) => Err(write.condition.conflict()),
            Ok(DirectWrite::NotVisible) => {
                debug!("pg-direct:not-visible thread_id={} tenant={tenant}", write.thread_id);
                Err(BackendError::ThreadNotFound)
            }
            Err(e) => {
                let budget = self.budget_for(&e);
                Err(e.into_backend(budget))
            }
        }
    }
}
