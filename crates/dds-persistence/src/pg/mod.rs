//! Acceso Postgres (Diesel + r2d2).
//!
//! - `PgPool` / `ConnectionProvider`: checkout de conexiones con timeout.
//! - `tenant`: unidad de trabajo bajo contexto de tenant (RLS).
//! - `direct`: backend transaccional con UPDATE condicional de versión.
//!
//! Toda unidad de trabajo corre dentro de una transacción con
//! `SET LOCAL statement_timeout`, de modo que ninguna consulta cuelga el
//! fallthrough de la cadena más allá del presupuesto configurado.
//!
//! Dos roles, dos pools: el camino directo usa un rol sujeto a RLS y el
//! cliente gestionado `PgManagedClient` uno con BYPASSRLS
//! (`role_bypasses_rls` lo verifica al armar la cadena).

pub mod direct;
pub mod tenant;

use std::time::Duration;

use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::sql_types::Bool;
use log::{info, warn};

use crate::config::DbConfig;
use crate::error::PersistenceError;
use crate::migrations::run_pending_migrations;

pub use direct::PgDirectBackend;
pub use tenant::{with_tenant_context, TENANT_SETTING};

pub type PgPool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

/// Origen de conexiones de los backends Postgres.
///
/// La conexión vuelve al pool al hacer drop, por cualquier camino de salida.
/// Los errores de checkout llegan como `TransientIo` o `Timeout`; los tests
/// inyectan proveedores caídos o lentos sin tocar r2d2.
pub trait ConnectionProvider: Send + Sync + 'static {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError>;
}

/// `ConnectionProvider` sobre un `PgPool`; los clones comparten el pool.
#[derive(Clone)]
pub struct PoolProvider {
    pub pool: PgPool,
}

impl ConnectionProvider for PoolProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        self.pool.get().map_err(PersistenceError::from)
    }
}

/// Ejecuta `f` en una transacción read-write con `statement_timeout` local.
///
/// La conexión se obtiene del provider y se devuelve al pool al salir (éxito,
/// error o panic dentro de `f`); la transacción se revierte ante cualquier
/// error.
pub fn with_statement_timeout<P, F, T>(provider: &P, statement_timeout: Duration, f: F) -> Result<T, PersistenceError>
    where P: ConnectionProvider + ?Sized,
          F: FnOnce(&mut PgConnection) -> Result<T, PersistenceError>
{
    let mut conn = provider.connection()?;
    conn.build_transaction().read_write().run(|tx| {
                                             set_local_statement_timeout(tx, statement_timeout)?;
                                             f(tx)
                                         })
}

pub(crate) fn set_local_statement_timeout(conn: &mut PgConnection, timeout: Duration) -> Result<(), PersistenceError> {
    // SET no acepta parámetros bind; el valor es un entero generado aquí.
    let ms = timeout.as_millis().max(1);
    diesel::sql_query(format!("SET LOCAL statement_timeout = {ms}")).execute(conn)?;
    Ok(())
}

#[derive(QueryableByName)]
struct RoleFlags {
    #[diesel(sql_type = Bool)]
    bypasses: bool,
}

/// `true` si el rol efectivo de la conexión no está sujeto a RLS
/// (superusuario o BYPASSRLS).
pub fn role_bypasses_rls<P: ConnectionProvider + ?Sized>(provider: &P) -> Result<bool, PersistenceError> {
    let mut conn = provider.connection()?;
    let flags: RoleFlags = diesel::sql_query("SELECT (rolsuper OR rolbypassrls) AS bypasses \
                                              FROM pg_roles WHERE rolname = current_user").get_result(&mut *conn)?;
    Ok(flags.bypasses)
}

/// Esperas entre intentos de `with_retry`; su largo acota los reintentos.
const RETRY_BACKOFF_MS: [u64; 2] = [10, 20];

/// Transitorio: la misma operación puede tener éxito al repetirla. Los
/// timeouts quedan fuera: el presupuesto del intento ya se consumió.
fn worth_repeating(err: &PersistenceError) -> bool {
    matches!(err, PersistenceError::SerializationConflict | PersistenceError::TransientIo(_))
}

/// Retry corto para las operaciones puntuales del cliente de servicio.
pub(crate) fn with_retry<F, T>(mut op: F) -> Result<T, PersistenceError>
    where F: FnMut() -> Result<T, PersistenceError>
{
    for wait_ms in RETRY_BACKOFF_MS {
        match op() {
            Err(err) if worth_repeating(&err) => {
                warn!("pg:retry err={err} sleep_ms={wait_ms}");
                std::thread::sleep(Duration::from_millis(wait_ms));
            }
            done => return done,
        }
    }
    op()
}

/// Tamaños del pool: ambos al menos 1 y `min_idle` nunca por encima de `max`.
fn pool_bounds(cfg: &DbConfig) -> (u32, u32) {
    let max = cfg.max_connections.max(1);
    (cfg.min_connections.clamp(1, max), max)
}

/// Pool r2d2 con `connect_timeout` como límite de checkout. Corre las
/// migraciones pendientes si `cfg.run_migrations`.
pub fn build_pool(cfg: &DbConfig) -> Result<PgPool, PersistenceError> {
    let (min_idle, max_size) = pool_bounds(cfg);
    if min_idle != cfg.min_connections {
        warn!("pg pool min_connections={} adjusted to {min_idle} (max={max_size})", cfg.min_connections);
    }
    let pool = r2d2::Pool::builder().min_idle(Some(min_idle))
                                    .max_size(max_size)
                                    .connection_timeout(cfg.connect_timeout)
                                    .build(ConnectionManager::<PgConnection>::new(cfg.url.as_str()))
                                    .map_err(|e| PersistenceError::TransientIo(format!("pool build: {e}")))?;
    if cfg.run_migrations {
        run_pending_migrations(&mut *pool.get()?)?;
    }
    info!("pg pool ready min_idle={min_idle} max={max_size} connect_timeout_ms={}",
          cfg.connect_timeout.as_millis());
    Ok(pool)
}
