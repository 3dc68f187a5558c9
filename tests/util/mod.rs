use parking_lot::Mutex;
use remote_index_cache::cache::CachedFacade;
use remote_index_cache::error::TransportError;
use remote_index_cache::remote::{
    Connector, FacadeSettings, RegexPostprocessor, RemoteFacade, RuleSet, Transport,
};
use remote_index_cache::storage::MemoryCacheStore;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Capture events from the current thread until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || TestWriter(writer.clone()))
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

type Handler = Arc<dyn Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync>;

/// Scripted stand-in for the remote index.
///
/// Each method answers through a registered handler; unscripted methods fail
/// with a protocol error. `getLastChange` answers from [`set_last_change`]
/// unless a handler overrides it, and fails while no time is set.
#[allow(dead_code)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    last_change_ms: Mutex<Option<f64>>,
    connects: AtomicUsize,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            handlers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            last_change_ms: Mutex::new(Some(0.0)),
            connects: AtomicUsize::new(0),
        })
    }

    pub fn on<F>(self: &Arc<Self>, method: &str, handler: F) -> Arc<Self>
    where
        F: Fn(&[Value]) -> Result<Value, TransportError> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(method.to_string(), Arc::new(handler));
        Arc::clone(self)
    }

    /// Always answer `method` with `value`.
    pub fn respond(self: &Arc<Self>, method: &str, value: Value) -> Arc<Self> {
        self.on(method, move |_| Ok(value.clone()))
    }

    /// Answer `lookup` from a URI → document table; unknown URIs yield `[null]`.
    pub fn with_documents(self: &Arc<Self>, documents: Value) -> Arc<Self> {
        self.on("lookup", move |params| {
            let uri = params[0][0].as_str().unwrap_or_default();
            Ok(json!([documents.get(uri).cloned().unwrap_or(Value::Null)]))
        })
    }

    /// Remote last-modified time in milliseconds; `None` makes the call fail.
    pub fn set_last_change(&self, ms: Option<f64>) {
        *self.last_change_ms.lock() = ms;
    }

    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    /// Calls other than the last-modified checks.
    pub fn data_calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m != "getLastChange")
            .collect()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn connector(self: &Arc<Self>) -> Connector {
        let mock = Arc::clone(self);
        Box::new(move || {
            mock.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::clone(&mock) as Arc<dyn Transport>)
        })
    }
}

impl Transport for MockTransport {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        self.calls.lock().push((method.to_string(), params.clone()));
        let handler = self.handlers.lock().get(method).cloned();
        match handler {
            Some(handler) => handler(&params),
            None if method == "getLastChange" => match *self.last_change_ms.lock() {
                Some(ms) => Ok(json!(ms)),
                None => Err(TransportError::Status(503)),
            },
            None => Err(TransportError::Protocol(format!("unscripted method {method}"))),
        }
    }
}

#[allow(dead_code)]
pub fn remote_facade(mock: &Arc<MockTransport>) -> RemoteFacade {
    RemoteFacade::new(
        FacadeSettings::default(),
        RegexPostprocessor::default(),
        mock.connector(),
    )
}

#[allow(dead_code)]
pub fn remote_facade_with_rules(mock: &Arc<MockTransport>, rules: &RuleSet) -> RemoteFacade {
    RemoteFacade::new(
        FacadeSettings::default(),
        RegexPostprocessor::new(rules).unwrap(),
        mock.connector(),
    )
}

#[allow(dead_code)]
pub fn cached_facade(mock: &Arc<MockTransport>) -> CachedFacade<MemoryCacheStore> {
    CachedFacade::new(remote_facade(mock), MemoryCacheStore::new())
}
