//! Unidad de trabajo bajo contexto de tenant.
//!
//! Las políticas RLS de `chat_threads` leen `current_setting('app.tenant_id')`.
//! El setting se fija con `set_config(.., true)` (equivalente a `SET LOCAL`):
//! vale sólo dentro de la transacción y desaparece al terminar, de modo que la
//! conexión vuelve al pool sin contexto residual de otro tenant.

use std::time::Duration;

use diesel::prelude::*;
use diesel::sql_types::Text;

use super::{set_local_statement_timeout, ConnectionProvider};
use crate::error::PersistenceError;

/// Nombre del setting de sesión que consultan las políticas RLS.
pub const TENANT_SETTING: &str = "app.tenant_id";

/// Ejecuta `f` dentro de una transacción con el tenant fijado y
/// `statement_timeout` local. Tenant vacío => `MissingTenant` sin tocar la base.
pub fn with_tenant_context<P, F, T>(provider: &P,
                                    tenant_id: &str,
                                    statement_timeout: Duration,
                                    f: F)
                                    -> Result<T, PersistenceError>
    where P: ConnectionProvider + ?Sized,
          F: FnOnce(&mut PgConnection) -> Result<T, PersistenceError>
{
    if tenant_id.trim().is_empty() {
        return Err(PersistenceError::MissingTenant);
    }
    let mut conn = provider.connection()?;
    conn.build_transaction().read_write().run(|tx| {
                                             set_local_statement_timeout(tx, statement_timeout)?;
                                             diesel::sql_query("SELECT set_config($1, $2, true)").bind::<Text, _>(TENANT_SETTING)
                                                                                                  .bind::<Text, _>(tenant_id)
                                                                                                  .execute(tx)?;
                                             f(tx)
                                         })
}
