use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use bytes::Bytes;
use tmc_client::{
    Backend, BackendError, Capabilities, ConfigError, ConnectError, Connector, MemClient,
    ServerConfig, Value,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Set {
        key: String,
        value: Vec<u8>,
        expiration: u32,
        flags: u32,
    },
    Get {
        key: String,
    },
    Incr {
        key: String,
        offset: u64,
    },
    Decr {
        key: String,
        offset: u64,
    },
    IncrSet {
        key: String,
        offset: u64,
        initial: u64,
        expiration: u32,
    },
    DecrSet {
        key: String,
        offset: u64,
        initial: u64,
        expiration: u32,
    },
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<Call>>,
    store: Mutex<HashMap<String, (Vec<u8>, u32)>>,
    counters: Mutex<HashMap<String, u64>>,
    connects: AtomicUsize,
    drops: AtomicUsize,
}

impl Shared {
    fn record(&self, call: Call) {
        self.calls.lock().expect("calls mutex").push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("calls mutex").clone()
    }
}

struct FakeBackend {
    shared: Arc<Shared>,
    caps: Capabilities,
    fail_arithmetic: bool,
}

impl Backend for FakeBackend {
    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn set(&self, key: &str, value: &[u8], expiration: u32, flags: u32) -> Result<(), BackendError> {
        self.shared.record(Call::Set {
            key: key.to_string(),
            value: value.to_vec(),
            expiration,
            flags,
        });
        self.shared
            .store
            .lock()
            .expect("store mutex")
            .insert(key.to_string(), (value.to_vec(), flags));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Value>, BackendError> {
        self.shared.record(Call::Get {
            key: key.to_string(),
        });
        let store = self.shared.store.lock().expect("store mutex");
        Ok(store.get(key).map(|(data, flags)| Value {
            data: Bytes::from(data.clone()),
            flags: *flags,
        }))
    }

    fn increment(&self, key: &str, offset: u64) -> Result<u64, BackendError> {
        self.shared.record(Call::Incr {
            key: key.to_string(),
            offset,
        });
        if self.fail_arithmetic {
            return Err(BackendError::Other("key not found".to_string()));
        }
        let mut counters = self.shared.counters.lock().expect("counters mutex");
        let value = counters.entry(key.to_string()).or_insert(0);
        *value += offset;
        Ok(*value)
    }

    fn decrement(&self, key: &str, offset: u64) -> Result<u64, BackendError> {
        self.shared.record(Call::Decr {
            key: key.to_string(),
            offset,
        });
        if self.fail_arithmetic {
            return Err(BackendError::Other("key not found".to_string()));
        }
        let mut counters = self.shared.counters.lock().expect("counters mutex");
        let value = counters.entry(key.to_string()).or_insert(0);
        *value = value.saturating_sub(offset);
        Ok(*value)
    }

    fn increment_with_initial(
        &self,
        key: &str,
        offset: u64,
        initial: u64,
        expiration: u32,
    ) -> Result<u64, BackendError> {
        self.shared.record(Call::IncrSet {
            key: key.to_string(),
            offset,
            initial,
            expiration,
        });
        let mut counters = self.shared.counters.lock().expect("counters mutex");
        let value = counters
            .entry(key.to_string())
            .and_modify(|value| *value += offset)
            .or_insert(initial);
        Ok(*value)
    }

    fn decrement_with_initial(
        &self,
        key: &str,
        offset: u64,
        initial: u64,
        expiration: u32,
    ) -> Result<u64, BackendError> {
        self.shared.record(Call::DecrSet {
            key: key.to_string(),
            offset,
            initial,
            expiration,
        });
        let mut counters = self.shared.counters.lock().expect("counters mutex");
        let value = counters
            .entry(key.to_string())
            .and_modify(|value| *value = value.saturating_sub(offset))
            .or_insert(initial);
        Ok(*value)
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.shared.drops.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeConnector {
    shared: Arc<Shared>,
    caps: Capabilities,
    fail_arithmetic: bool,
    fail_connect: bool,
}

impl FakeConnector {
    fn ok(shared: Arc<Shared>) -> Self {
        FakeConnector {
            shared,
            caps: Capabilities::default(),
            fail_arithmetic: false,
            fail_connect: false,
        }
    }
}

impl Connector for FakeConnector {
    fn connect(&self) -> Result<Box<dyn Backend>, ConnectError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(ConnectError::Config(ConfigError::Empty));
        }
        Ok(Box::new(FakeBackend {
            shared: Arc::clone(&self.shared),
            caps: self.caps,
            fail_arithmetic: self.fail_arithmetic,
        }))
    }
}

/// Counts tracing events emitted on the current thread.
struct CountingSubscriber {
    events: Arc<AtomicUsize>,
}

impl tracing::Subscriber for CountingSubscriber {
    fn enabled(&self, _metadata: &tracing::Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _attrs: &tracing::span::Attributes<'_>) -> tracing::span::Id {
        tracing::span::Id::from_u64(1)
    }

    fn record(&self, _id: &tracing::span::Id, _values: &tracing::span::Record<'_>) {}

    fn record_follows_from(&self, _id: &tracing::span::Id, _follows: &tracing::span::Id) {}

    fn event(&self, _event: &tracing::Event<'_>) {
        self.events.fetch_add(1, Ordering::SeqCst);
    }

    fn enter(&self, _id: &tracing::span::Id) {}

    fn exit(&self, _id: &tracing::span::Id) {}
}

fn fake_client(shared: Arc<Shared>) -> MemClient {
    MemClient::with_connector(Box::new(FakeConnector::ok(shared)))
}

#[test]
fn set_then_get_forwards_bytes_unchanged() {
    let shared = Arc::new(Shared::default());
    let client = fake_client(Arc::clone(&shared));

    client.set("greeting", b"hello\xffworld", 30, 7);
    let value = client.get("greeting").expect("value");
    assert_eq!(value.data.as_ref(), b"hello\xffworld");
    assert_eq!(value.flags, 7);

    assert_eq!(
        shared.calls(),
        vec![
            Call::Set {
                key: "greeting".to_string(),
                value: b"hello\xffworld".to_vec(),
                expiration: 30,
                flags: 7,
            },
            Call::Get {
                key: "greeting".to_string(),
            },
        ]
    );
}

#[test]
fn get_on_missing_key_returns_none() {
    let shared = Arc::new(Shared::default());
    let client = fake_client(shared);
    assert_eq!(client.get("absent"), None);
}

#[test]
fn operations_degrade_when_no_servers_are_configured() {
    let client = MemClient::new(ServerConfig::host_port(""));
    assert_eq!(client.handle_id(), None);
    assert_eq!(client.get("key"), None);
    client.set("key", b"value", 0, 0);
    assert_eq!(client.incr("key", 1), 0);
    assert_eq!(client.decr("key", 1), 0);
}

#[test]
fn arithmetic_failure_maps_to_zero() {
    let shared = Arc::new(Shared::default());
    let client = MemClient::with_connector(Box::new(FakeConnector {
        shared: Arc::clone(&shared),
        caps: Capabilities::default(),
        fail_arithmetic: true,
        fail_connect: false,
    }));

    assert_eq!(client.incr("hits", 5), 0);
    assert_eq!(client.decr("hits", 5), 0);
    assert_eq!(shared.calls().len(), 2);
}

#[test]
fn arithmetic_on_live_backend_returns_counter() {
    let shared = Arc::new(Shared::default());
    let client = fake_client(shared);

    assert_eq!(client.incr("hits", 5), 5);
    assert_eq!(client.incr("hits", 2), 7);
    assert_eq!(client.decr("hits", 3), 4);
}

#[test]
fn unsupported_initial_arithmetic_skips_backend_and_logs_once() {
    let shared = Arc::new(Shared::default());
    let client = fake_client(Arc::clone(&shared));
    // Create the handle before installing the counting subscriber so only
    // the unsupported-operation diagnostic is counted.
    client.handle_id().expect("handle");

    let events = Arc::new(AtomicUsize::new(0));
    let subscriber = CountingSubscriber {
        events: Arc::clone(&events),
    };
    let result = tracing::subscriber::with_default(subscriber, || {
        client.incr_set("hits", 1, 10, 60)
    });

    assert_eq!(result, 0);
    assert_eq!(events.load(Ordering::SeqCst), 1);
    assert!(shared.calls().is_empty(), "backend must not be called");
}

#[test]
fn unsupported_initial_decrement_returns_zero_without_backend_call() {
    let shared = Arc::new(Shared::default());
    let client = fake_client(Arc::clone(&shared));

    assert_eq!(client.decr_set("hits", 1, 10, 60), 0);
    assert!(shared.calls().is_empty(), "backend must not be called");
}

#[test]
fn supported_initial_arithmetic_forwards_all_arguments() {
    let shared = Arc::new(Shared::default());
    let client = MemClient::with_connector(Box::new(FakeConnector {
        shared: Arc::clone(&shared),
        caps: Capabilities { with_initial: true },
        fail_arithmetic: false,
        fail_connect: false,
    }));

    assert_eq!(client.incr_set("hits", 3, 10, 60), 10);
    assert_eq!(client.incr_set("hits", 3, 10, 60), 13);
    assert_eq!(client.decr_set("hits", 1, 99, 30), 12);

    assert_eq!(
        shared.calls()[0],
        Call::IncrSet {
            key: "hits".to_string(),
            offset: 3,
            initial: 10,
            expiration: 60,
        }
    );
    assert_eq!(
        shared.calls()[2],
        Call::DecrSet {
            key: "hits".to_string(),
            offset: 1,
            initial: 99,
            expiration: 30,
        }
    );
}

#[test]
fn threads_receive_distinct_stable_handles() {
    let shared = Arc::new(Shared::default());
    let client = Arc::new(fake_client(Arc::clone(&shared)));

    let first = client.handle_id().expect("handle");
    let second = client.handle_id().expect("handle");
    assert_eq!(first, second, "same thread must reuse its handle");

    let worker_client = Arc::clone(&client);
    let worker_id = thread::spawn(move || worker_client.handle_id().expect("handle"))
        .join()
        .expect("worker thread");
    assert_ne!(first, worker_id, "threads must not share a handle");

    assert_eq!(shared.connects.load(Ordering::SeqCst), 2);
}

#[test]
fn thread_exit_releases_the_handle_exactly_once() {
    let shared = Arc::new(Shared::default());
    let client = Arc::new(fake_client(Arc::clone(&shared)));

    let worker_client = Arc::clone(&client);
    thread::spawn(move || {
        worker_client.handle_id().expect("handle");
        worker_client.get("key");
    })
    .join()
    .expect("worker thread");

    assert_eq!(shared.connects.load(Ordering::SeqCst), 1);
    assert_eq!(shared.drops.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_connect_is_retried_on_the_next_call() {
    let shared = Arc::new(Shared::default());
    let client = MemClient::with_connector(Box::new(FakeConnector {
        shared: Arc::clone(&shared),
        caps: Capabilities::default(),
        fail_arithmetic: false,
        fail_connect: true,
    }));

    assert_eq!(client.get("key"), None);
    assert_eq!(client.get("key"), None);
    assert_eq!(shared.connects.load(Ordering::SeqCst), 2);
}

#[test]
fn clients_do_not_share_handles() {
    let shared_a = Arc::new(Shared::default());
    let shared_b = Arc::new(Shared::default());
    let client_a = fake_client(Arc::clone(&shared_a));
    let client_b = fake_client(Arc::clone(&shared_b));

    let id_a = client_a.handle_id().expect("handle");
    let id_b = client_b.handle_id().expect("handle");
    assert_ne!(id_a, id_b);
    assert_eq!(shared_a.connects.load(Ordering::SeqCst), 1);
    assert_eq!(shared_b.connects.load(Ordering::SeqCst), 1);
}
