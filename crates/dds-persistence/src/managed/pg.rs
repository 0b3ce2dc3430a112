//! Cliente gestionado sobre la conexión de servicio (sin contexto de tenant).
//!
//! Para despliegues sin PostgREST: lectura y escritura puntual de
//! `chat_threads.metadata` sobre un pool propio (`DATABASE_SERVICE_URL`) cuyo
//! rol tiene BYPASSRLS. El pool del camino directo no sirve: bajo FORCE RLS no
//! ve filas con tenant fuera de un contexto de tenant.
//!
//! Operaciones idempotentes, así que usan el retry corto del pool ante errores
//! transitorios.

use std::time::Duration;

use chrono::Utc;
use dds_core::ThreadId;
use diesel::prelude::*;
use serde_json::{Map, Value};

use super::ManagedClient;
use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::pg::{with_retry, with_statement_timeout, ConnectionProvider, PoolProvider};
use crate::schema::chat_threads::dsl::{chat_threads, id, metadata, updated_at};

pub struct PgManagedClient<P: ConnectionProvider = PoolProvider> {
    pub provider: P,
    connect_timeout: Duration,
    statement_timeout: Duration,
}

impl<P: ConnectionProvider> PgManagedClient<P> {
    pub fn new(provider: P, cfg: &DbConfig) -> Self {
        Self { provider,
               connect_timeout: cfg.connect_timeout,
               statement_timeout: cfg.statement_timeout }
    }
}

impl<P: ConnectionProvider> ManagedClient for PgManagedClient<P> {
    fn fetch_metadata(&self, thread_id: &ThreadId) -> Result<Option<Map<String, Value>>, PersistenceError> {
        let stored: Option<Value> = with_retry(|| {
            with_statement_timeout(&self.provider, self.statement_timeout, |conn| {
                Ok(chat_threads.filter(id.eq(thread_id.as_str()))
                               .select(metadata)
                               .first::<Option<Value>>(conn)?)
            })
        })?;
        match stored {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(PersistenceError::Decode(format!("metadata is not an object: {other}"))),
        }
    }

    fn update_metadata(&self, thread_id: &ThreadId, md: &Map<String, Value>) -> Result<(), PersistenceError> {
        let affected = with_retry(|| {
            with_statement_timeout(&self.provider, self.statement_timeout, |conn| {
                Ok(diesel::update(chat_threads.filter(id.eq(thread_id.as_str())))
                       .set((metadata.eq(Some(Value::Object(md.clone()))), updated_at.eq(Utc::now())))
                       .execute(conn)?)
            })
        })?;
        if affected == 0 {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        self.connect_timeout + self.statement_timeout
    }
}
