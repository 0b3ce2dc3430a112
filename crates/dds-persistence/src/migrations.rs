//! Wrapper para correr migraciones embebidas.
//!
//! Las migraciones Diesel viven en `migrations/` de este crate y se embeben en
//! el binario. `build_pool` las ejecuta una vez si `DbConfig::run_migrations`.

use crate::error::PersistenceError;
use diesel::pg::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

pub fn run_pending_migrations(conn: &mut PgConnection) -> Result<(), PersistenceError> {
    let applied = conn.run_pending_migrations(MIGRATIONS)
                      .map_err(|e| PersistenceError::Unknown(format!("migration error: {e}")))?;
    if !applied.is_empty() {
        info!("migrations applied: {}", applied.len());
    }
    Ok(())
}
