//! dds-persistence: backends Postgres del store de estado de diálogo.
//!
//! - `pg`: pool r2d2, contexto de tenant y camino directo con UPDATE condicional.
//! - `managed`: cliente gestionado (PostgREST o conexión de servicio) con
//!   read-merge-write de `metadata`.
//! - `config`: configuración desde entorno (`.env` vía dotenvy).
//! - `migrations`: migraciones Diesel embebidas (`chat_threads` + RLS).
pub mod config;
mod document;
pub mod error;
pub mod managed;
pub mod migrations;
pub mod pg;
pub mod schema;

pub use config::{DbConfig, ManagedConfig};
pub use error::PersistenceError;
pub use managed::{ManagedBackend, ManagedClient, PgManagedClient, RestManagedClient};
pub use pg::{build_pool, role_bypasses_rls, with_tenant_context, ConnectionProvider, PgDirectBackend, PgPool, PoolProvider};
