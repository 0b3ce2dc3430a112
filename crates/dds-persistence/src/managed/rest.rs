//! Cliente PostgREST (Supabase) bloqueante.
//!
//! Cada petición lleva el timeout de `ManagedConfig::timeout`; un timeout de
//! `reqwest` se mapea a `PersistenceError::Timeout` y la cadena continúa.

use std::time::Duration;

use dds_core::ThreadId;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::ManagedClient;
use crate::config::ManagedConfig;
use crate::error::PersistenceError;

#[derive(Debug, Deserialize)]
struct MetadataRow {
    metadata: Option<Map<String, Value>>,
}

pub struct RestManagedClient {
    http: Client,
    cfg: ManagedConfig,
}

impl RestManagedClient {
    pub fn new(cfg: ManagedConfig) -> Result<Self, PersistenceError> {
        let http = Client::builder().timeout(cfg.timeout)
                                    .build()
                                    .map_err(|e| PersistenceError::Config(format!("http client: {e}")))?;
        Ok(Self { http, cfg })
    }

    pub fn from_env() -> Result<Self, PersistenceError> {
        Self::new(ManagedConfig::from_env()?)
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.cfg.base_url, self.cfg.table)
    }

    fn authorized(&self, req: RequestBuilder, thread_id: &ThreadId) -> RequestBuilder {
        req.query(&[("id", id_filter(thread_id))])
           .header("apikey", &self.cfg.service_key)
           .bearer_auth(&self.cfg.service_key)
           .header("Accept", "application/json")
    }
}

/// Filtro PostgREST de igualdad sobre la PK.
fn id_filter(thread_id: &ThreadId) -> String {
    format!("eq.{}", thread_id.as_str())
}

fn ensure_success(resp: Response) -> Result<Response, PersistenceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(PersistenceError::Http { status: status.as_u16(),
                                 body })
}

impl ManagedClient for RestManagedClient {
    fn fetch_metadata(&self, thread_id: &ThreadId) -> Result<Option<Map<String, Value>>, PersistenceError> {
        let req = self.authorized(self.http.get(self.endpoint()), thread_id)
                      .query(&[("select", "metadata")]);
        let rows: Vec<MetadataRow> = ensure_success(req.send()?)?.json()?;
        rows.into_iter()
            .next()
            .map(|row| row.metadata)
            .ok_or(PersistenceError::NotFound)
    }

    fn update_metadata(&self, thread_id: &ThreadId, metadata: &Map<String, Value>) -> Result<(), PersistenceError> {
        let req = self.authorized(self.http.patch(self.endpoint()), thread_id)
                      .header("Prefer", "return=representation")
                      .json(&json!({ "metadata": metadata }));
        // con return=representation un PATCH sin coincidencias devuelve []
        let rows: Vec<Value> = ensure_success(req.send()?)?.json()?;
        if rows.is_empty() {
            return Err(PersistenceError::NotFound);
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        self.cfg.timeout
    }
}
