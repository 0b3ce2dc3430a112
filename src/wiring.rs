//! Armado de la cadena de fallback desde configuración.
//!
//! Orden fijo:
//! 1. camino directo, si hay `DATABASE_URL` y el pool levanta;
//! 2. cliente gestionado: REST si está configurado, si no Postgres sobre
//!    `DATABASE_SERVICE_URL` (pool propio, rol con BYPASSRLS);
//! 3. cache en memoria, siempre al final.
//!
//! El cliente gestionado nunca reutiliza el pool del camino directo: con
//! `FORCE ROW LEVEL SECURITY` ese rol no ve los threads de ningún tenant fuera
//! de un contexto de tenant, y si lo viera el RLS del camino directo no
//! aislaría nada.

use dds_core::{InMemoryStateCache, StateStore, StateStoreBuilder};
use dds_persistence::pg::build_pool;
use dds_persistence::{role_bypasses_rls, DbConfig, ManagedBackend, ManagedConfig, PgDirectBackend, PgManagedClient,
                      PoolProvider, RestManagedClient};
use log::{info, warn};

/// Configuración de cada eslabón; `None` lo deja fuera de la cadena.
#[derive(Debug, Clone, Default)]
pub struct ChainConfig {
    pub direct: Option<DbConfig>,
    pub service: Option<DbConfig>,
    pub rest: Option<ManagedConfig>,
}

impl ChainConfig {
    /// Lee el entorno (`.env` incluido). La configuración ausente sólo deja
    /// fuera el eslabón correspondiente.
    pub fn from_env() -> Self {
        dds_persistence::config::init_dotenv();
        Self { direct: DbConfig::from_env().map_err(|e| info!("direct path disabled: {e}")).ok(),
               service: DbConfig::service_from_env().map_err(|e| info!("pg managed client disabled: {e}"))
                                                    .ok(),
               rest: ManagedConfig::from_env().map_err(|e| info!("rest managed client disabled: {e}")).ok() }
    }
}

/// Store listo para producción a partir del entorno. Nunca falla: queda al
/// menos la memoria.
pub fn build_store_from_env() -> StateStore {
    build_store(&ChainConfig::from_env(), InMemoryStateCache::new())
}

pub fn build_store(cfg: &ChainConfig, cache: InMemoryStateCache) -> StateStore {
    let mut builder = StateStore::builder();
    if let Some(db) = &cfg.direct {
        match build_pool(db) {
            Ok(pool) => builder = builder.backend(PgDirectBackend::new(PoolProvider { pool }, db)),
            Err(e) => warn!("postgres unavailable at startup, skipping direct path: {e}"),
        }
    }
    builder = with_managed(builder, cfg);
    let store = builder.backend(cache).build();
    info!("state store chain: {}", store.backend_names().join(" -> "));
    store
}

fn with_managed(builder: StateStoreBuilder, cfg: &ChainConfig) -> StateStoreBuilder {
    if let Some(rest) = &cfg.rest {
        match RestManagedClient::new(rest.clone()) {
            Ok(client) => return builder.backend(ManagedBackend::new(client)),
            Err(e) => warn!("rest managed client disabled: {e}"),
        }
    }
    let Some(service) = &cfg.service else {
        return builder;
    };
    let provider = match build_pool(service) {
        Ok(pool) => PoolProvider { pool },
        Err(e) => {
            warn!("service connection unavailable at startup, skipping pg managed client: {e}");
            return builder;
        }
    };
    match role_bypasses_rls(&provider) {
        Ok(true) => builder.backend(ManagedBackend::new(PgManagedClient::new(provider, service))),
        Ok(false) => {
            warn!("DATABASE_SERVICE_URL role is subject to row level security, skipping pg managed client");
            builder
        }
        Err(e) => {
            warn!("could not inspect service role, skipping pg managed client: {e}");
            builder
        }
    }
}
