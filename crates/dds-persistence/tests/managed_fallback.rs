//! Fallback directo -> gestionado -> memoria sin base de datos: el camino
//! directo usa un proveedor de conexiones caído y el gestionado un cliente falso.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use dds_core::{InMemoryStateCache, StateStore, StateStoreError, ThreadId, WriteGuarantee};
use dds_persistence::pg::{ConnectionProvider, PgDirectBackend, PgPooledConnection};
use dds_persistence::{DbConfig, ManagedBackend, ManagedClient, PersistenceError};
use serde_json::{json, Map, Value};

/// Proveedor que nunca entrega conexión.
struct DownProvider {
    timeout: bool,
}

impl ConnectionProvider for DownProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        if self.timeout {
            Err(PersistenceError::Timeout("pool checkout: timed out waiting for connection".into()))
        } else {
            Err(PersistenceError::TransientIo("pool error: connection refused".into()))
        }
    }
}

/// Proveedor que consume su presupuesto de checkout antes de rendirse, como
/// un pool cuyo servidor no responde.
struct SlowProvider {
    stall: Duration,
}

impl ConnectionProvider for SlowProvider {
    fn connection(&self) -> Result<PgPooledConnection, PersistenceError> {
        thread::sleep(self.stall);
        Err(PersistenceError::Timeout(format!("pool checkout: timed out after {}ms", self.stall.as_millis())))
    }
}

fn down_direct(timeout: bool) -> PgDirectBackend<DownProvider> {
    PgDirectBackend::new(DownProvider { timeout }, &DbConfig::new("postgres://unused/dds"))
}

/// Cliente gestionado en memoria; `outage` fuerza errores y `gate` sincroniza
/// escritores justo antes de escribir (después de su chequeo previo).
#[derive(Default)]
struct FakeManaged {
    rows: Mutex<HashMap<String, Option<Map<String, Value>>>>,
    outage: Option<fn() -> PersistenceError>,
    gate: Mutex<Option<Arc<Barrier>>>,
    updates: AtomicUsize,
}

impl FakeManaged {
    fn with_thread(id: &str, metadata: Value) -> Self {
        let fake = Self::default();
        let Value::Object(md) = metadata else { unreachable!() };
        fake.rows.lock().unwrap().insert(id.to_string(), Some(md));
        fake
    }

    fn down(outage: fn() -> PersistenceError) -> Self {
        Self { outage: Some(outage),
               ..Self::default() }
    }

    fn metadata(&self, id: &str) -> Map<String, Value> {
        self.rows.lock().unwrap()[id].clone().unwrap_or_default()
    }
}

impl ManagedClient for FakeManaged {
    fn fetch_metadata(&self, thread_id: &ThreadId) -> Result<Option<Map<String, Value>>, PersistenceError> {
        if let Some(outage) = self.outage {
            return Err(outage());
        }
        self.rows
            .lock()
            .unwrap()
            .get(thread_id.as_str())
            .cloned()
            .ok_or(PersistenceError::NotFound)
    }

    fn update_metadata(&self, thread_id: &ThreadId, metadata: &Map<String, Value>) -> Result<(), PersistenceError> {
        if let Some(outage) = self.outage {
            return Err(outage());
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait();
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(thread_id.as_str()).ok_or(PersistenceError::NotFound)?;
        *row = Some(metadata.clone());
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(500)
    }
}

#[test]
fn direct_outage_falls_through_to_managed_and_keeps_siblings() {
    let managed = Arc::new(ManagedBackend::new(FakeManaged::with_thread("t", json!({"visitor_id": "v-1"}))));
    let cache = InMemoryStateCache::new();
    let store = StateStore::builder().backend(down_direct(false))
                                     .shared_backend(managed.clone())
                                     .backend(cache.clone())
                                     .build();
    assert_eq!(store.backend_names(), vec!["pg-direct", "managed", "in-memory"]);

    let t: ThreadId = "t".into();
    let out = store.save(&t, json!({"stage": "greeting"}), Some("t1")).unwrap();
    assert_eq!(out.backend, "managed");
    assert_eq!(out.guarantee, WriteGuarantee::BestEffort);
    assert!(cache.is_empty());

    let md = managed.client.metadata("t");
    assert_eq!(md["visitor_id"], json!("v-1"));
    assert_eq!(md["dds_state"]["_tenant_id"], json!("t1"));
    assert_eq!(store.load(&t).unwrap().unwrap().get("stage"), Some(&json!("greeting")));
}

#[test]
fn both_database_paths_down_uses_memory() {
    let cache = InMemoryStateCache::new();
    let store = StateStore::builder().backend(down_direct(true))
                                     .backend(ManagedBackend::new(FakeManaged::down(|| {
                                                                      PersistenceError::Timeout("managed request: timed out".into())
                                                                  })))
                                     .backend(cache.clone())
                                     .build();
    let t: ThreadId = "dev".into();
    let first = store.save(&t, json!({"stage": "greeting"}), Some("t1")).unwrap();
    assert_eq!(first.backend, "in-memory");
    assert_eq!(first.guarantee, WriteGuarantee::ProcessLocal);

    let mut st = store.load(&t).unwrap().unwrap();
    st.insert("stage", json!("name"));
    let second = store.save(&t, st.into_document(), Some("t1")).unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(cache.len(), 1);
}

#[test]
fn exhausted_chain_reports_timeouts_with_their_budget() {
    let store = StateStore::builder().backend(down_direct(true))
                                     .backend(ManagedBackend::new(FakeManaged::down(|| {
                                                                      PersistenceError::Http { status: 503,
                                                                                               body: "upstream".into() }
                                                                  })))
                                     .build();
    // Sin lector disponible la lectura previa ya falla.
    match store.save(&"x".into(), json!({}), Some("t1")).unwrap_err() {
        StateStoreError::StorageUnavailable { attempts } => {
            assert_eq!(attempts.len(), 2);
            assert_eq!(attempts[0].backend, "pg-direct");
            assert!(attempts[0].reason.contains("timed out"), "{}", attempts[0].reason);
            assert_eq!(attempts[1].backend, "managed");
            assert!(attempts[1].reason.contains("503"), "{}", attempts[1].reason);
        }
        other => panic!("inesperado: {other:?}"),
    }
}

#[test]
fn direct_timeout_is_reported_as_timeout() {
    use dds_core::{stamp, BackendError, StateBackend};
    let Value::Object(candidate) = json!({"a": 1}) else { unreachable!() };
    let write = stamp(&"x".into(), None, &candidate, Some("t1"), chrono::Utc::now()).unwrap();
    let cfg = DbConfig::new("postgres://unused/dds");
    assert_eq!(down_direct(true).attempt_save(&write),
               Err(BackendError::Timeout { after: cfg.connect_timeout }));
    assert!(matches!(down_direct(false).attempt_save(&write), Err(BackendError::Unavailable(_))));

    let untenanted = stamp(&"x".into(), None, &candidate, None, chrono::Utc::now()).unwrap();
    assert!(matches!(down_direct(false).attempt_save(&untenanted), Err(BackendError::Skipped(_))));
}

#[test]
fn missing_thread_in_managed_client_is_not_cached() {
    let cache = InMemoryStateCache::new();
    let store = StateStore::builder().backend(down_direct(false))
                                     .backend(ManagedBackend::new(FakeManaged::default()))
                                     .backend(cache.clone())
                                     .build();
    let err = store.save(&"ghost".into(), json!({"stage": "greeting"}), Some("t1")).unwrap_err();
    assert_eq!(err, StateStoreError::ThreadNotFound { thread_id: "ghost".into() });
    assert!(cache.is_empty());
}

/// Asimetría: sin predicado en la base, dos escritores sobre la misma base
/// pasan ambos el chequeo previo y ambos "ganan"; el último sobrescribe.
#[test]
fn managed_path_has_no_hard_ordering_guarantee() {
    let managed = Arc::new(ManagedBackend::new(FakeManaged::with_thread("abc", json!({}))));
    let store = Arc::new(StateStore::builder().shared_backend(managed.clone()).build());
    let abc: ThreadId = "abc".into();
    store.save(&abc, json!({"stage": "greeting"}), None).unwrap();

    *managed.client.gate.lock().unwrap() = Some(Arc::new(Barrier::new(2)));
    let loaded = Arc::new(Barrier::new(2));
    let handles: Vec<_> = ["name", "age"].into_iter()
                                         .map(|stage| {
                                             let store = Arc::clone(&store);
                                             let loaded = Arc::clone(&loaded);
                                             let abc = abc.clone();
                                             thread::spawn(move || {
                                                 let mut st = store.load(&abc).unwrap().unwrap();
                                                 st.insert("stage", json!(stage));
                                                 loaded.wait();
                                                 store.save(&abc, st.into_document(), None)
                                             })
                                         })
                                         .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|r| r.is_ok()), "{results:?}");
    assert!(results.iter().all(|r| r.as_ref().unwrap().version == 2));
    assert_eq!(managed.client.updates.load(Ordering::SeqCst), 3);
}

#[test]
fn stalled_direct_path_hands_over_to_managed_within_its_budget() {
    let mut cfg = DbConfig::new("postgres://unused/dds");
    cfg.connect_timeout = Duration::from_millis(300);
    let stalled = PgDirectBackend::new(SlowProvider { stall: cfg.connect_timeout }, &cfg);
    let managed = Arc::new(ManagedBackend::new(FakeManaged::with_thread("slow", json!({"visitor_id": "v-3"}))));
    let store = StateStore::builder().backend(stalled).shared_backend(managed.clone()).build();

    let started = Instant::now();
    let out = store.save(&"slow".into(), json!({"stage": "greeting"}), Some("t1")).unwrap();
    let elapsed = started.elapsed();
    assert_eq!(out.backend, "managed");
    // una espera para la lectura base y otra para el UPDATE, nada más
    assert!(elapsed >= 2 * cfg.connect_timeout, "{elapsed:?}");
    assert!(elapsed < 2 * cfg.connect_timeout + managed.client.request_timeout(), "{elapsed:?}");
    assert_eq!(managed.client.metadata("slow")["visitor_id"], json!("v-3"));
}

#[test]
fn managed_fallback_never_overwrites_another_tenants_state() {
    let managed = Arc::new(ManagedBackend::new(FakeManaged::with_thread("owned",
                                                                        json!({"dds_state": {"_version": 3,
                                                                                             "_tenant_id": "t1",
                                                                                             "stage": "age"}}))));
    let cache = InMemoryStateCache::new();
    let store = StateStore::builder().backend(down_direct(false))
                                     .shared_backend(managed.clone())
                                     .backend(cache.clone())
                                     .build();
    let t: ThreadId = "owned".into();

    assert_eq!(store.load_scoped(&t, Some("t2")).unwrap(), None);
    let err = store.save(&t, json!({"stage": "hijack"}), Some("t2")).unwrap_err();
    assert_eq!(err, StateStoreError::ThreadNotFound { thread_id: "owned".into() });
    assert_eq!(managed.client.updates.load(Ordering::SeqCst), 0);
    assert!(cache.is_empty());
    assert_eq!(managed.client.metadata("owned")["dds_state"]["stage"], json!("age"));
}
