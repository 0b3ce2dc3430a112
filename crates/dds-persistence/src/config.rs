//! Carga de configuración de conexión desde variables de entorno.
//! - `DATABASE_URL`: camino directo (rol sujeto a RLS).
//! - `DATABASE_SERVICE_URL`: cliente gestionado sobre Postgres (rol con BYPASSRLS).
//! - `SUPABASE_URL` + `SUPABASE_SERVICE_ROLE_KEY`: cliente gestionado PostgREST.

use std::env;
use std::time::Duration;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::error::PersistenceError;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

pub const DEFAULT_THREADS_TABLE: &str = "chat_threads";

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    /// Espera máxima para obtener una conexión del pool.
    pub connect_timeout: Duration,
    /// `SET LOCAL statement_timeout` aplicado a cada unidad de trabajo.
    pub statement_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// Configuración con valores por defecto para una URL dada.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(),
               min_connections: 2,
               max_connections: 16,
               connect_timeout: Duration::from_millis(2_000),
               statement_timeout: Duration::from_millis(3_000),
               run_migrations: true }
    }

    /// Conexión del camino directo (`DATABASE_URL`). Su rol queda sujeto a
    /// RLS: sin BYPASSRLS y, con FORCE, da igual que sea owner.
    pub fn from_env() -> Result<Self, PersistenceError> {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_URL").map_err(|_| PersistenceError::Config("DATABASE_URL no definido".into()))?;
        Ok(Self::with_env_overrides(url))
    }

    /// Conexión de servicio para `PgManagedClient` (`DATABASE_SERVICE_URL`).
    /// Su rol debe tener BYPASSRLS: lee y escribe threads de cualquier tenant
    /// y también los que se guardan sin tenant.
    pub fn service_from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let url = env::var("DATABASE_SERVICE_URL").map_err(|_| {
                                                      PersistenceError::Config("DATABASE_SERVICE_URL no definido".into())
                                                  })?;
        Ok(Self::with_env_overrides(url))
    }

    fn with_env_overrides(url: String) -> Self {
        let defaults = Self::new(url);
        Self { min_connections: env_parse("DATABASE_MIN_CONNECTIONS").unwrap_or(defaults.min_connections),
               max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
               connect_timeout: env_millis("DDS_CONNECT_TIMEOUT_MS").unwrap_or(defaults.connect_timeout),
               statement_timeout: env_millis("DDS_STATEMENT_TIMEOUT_MS").unwrap_or(defaults.statement_timeout),
               run_migrations: env_parse("DDS_RUN_MIGRATIONS").unwrap_or(defaults.run_migrations),
               ..defaults }
    }
}

/// Cliente gestionado (Supabase / PostgREST). Sin contexto de tenant: usa la
/// service-role key.
#[derive(Clone)]
pub struct ManagedConfig {
    pub base_url: String,
    pub service_key: String,
    pub timeout: Duration,
    pub table: String,
}

impl std::fmt::Debug for ManagedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedConfig")
         .field("base_url", &self.base_url)
         .field("service_key", &"<redacted>")
         .field("timeout", &self.timeout)
         .field("table", &self.table)
         .finish()
    }
}

impl ManagedConfig {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string(),
               service_key: service_key.into(),
               timeout: Duration::from_millis(3_000),
               table: DEFAULT_THREADS_TABLE.to_string() }
    }

    pub fn from_env() -> Result<Self, PersistenceError> {
        Lazy::force(&DOTENV_LOADED);
        let base_url = env::var("SUPABASE_URL").or_else(|_| env::var("NEXT_PUBLIC_SUPABASE_URL"))
                                               .map_err(|_| PersistenceError::Config("SUPABASE_URL no definido".into()))?;
        let service_key = env::var("SUPABASE_SERVICE_ROLE_KEY").map_err(|_| {
                                                                  PersistenceError::Config("SUPABASE_SERVICE_ROLE_KEY no definido".into())
                                                              })?;
        let mut cfg = Self::new(base_url, service_key);
        if let Some(t) = env_millis("DDS_MANAGED_TIMEOUT_MS") {
            cfg.timeout = t;
        }
        if let Ok(table) = env::var("DDS_THREADS_TABLE") {
            cfg.table = table;
        }
        Ok(cfg)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_millis)
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
