//! Demo: dos "procesos" cargan la misma versión de un thread y guardan
//! cambios distintos; el segundo recibe el conflicto.
//!
//! Uso: `dds-demo [thread_id]` (por defecto `abc`). Con `DDS_DEMO_TENANT` la
//! lectura y la escritura intentan primero el camino directo bajo ese tenant.

use std::error::Error;

use dds_store::{build_store_from_env, ApiOutcome, StateStore, ThreadId};
use env_logger::Env;
use serde_json::{json, Value};

fn with_stage(store: &StateStore, thread_id: &ThreadId, tenant: Option<&str>, stage: &str)
              -> Result<Value, Box<dyn Error>> {
    let mut state = store.load_scoped(thread_id, tenant)?.unwrap_or_default();
    state.insert("stage", json!(stage));
    Ok(state.into_document())
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let thread_id: ThreadId = std::env::args().nth(1).unwrap_or_else(|| "abc".to_string()).into();
    let tenant = std::env::var("DDS_DEMO_TENANT").ok();
    let store = build_store_from_env();

    let seeded = store.save(&thread_id, json!({"stage": "greeting"}), tenant.as_deref())?;
    println!("seeded {thread_id} v{} via {}", seeded.version, seeded.backend);

    let name = with_stage(&store, &thread_id, tenant.as_deref(), "name")?;
    let age = with_stage(&store, &thread_id, tenant.as_deref(), "age")?;

    let first = store.save(&thread_id, name, tenant.as_deref())?;
    println!("first writer -> v{} via {} ({:?})", first.version, first.backend, first.guarantee);

    match store.save(&thread_id, age, tenant.as_deref()) {
        Ok(out) => println!("second writer -> v{} via {} (no conflict detected)", out.version, out.backend),
        Err(e) => {
            let outcome = ApiOutcome::from_error(&e);
            println!("second writer -> HTTP {} {}", outcome.status(), serde_json::to_string(&outcome)?);
        }
    }

    if let Some(state) = store.load_scoped(&thread_id, tenant.as_deref())? {
        println!("stored: {}", serde_json::to_string_pretty(&state)?);
    }
    Ok(())
}
