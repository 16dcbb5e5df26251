//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use giop::{
    CallContext, Connector, DispatchError, Endpoint, GiopServer, GiopServerConfig, GiopVersion,
    IncomingRequest, ServantDispatcher, SystemException, TcpConnector,
};
use iiop::{AlternateIiopAddressComponentData, InternetIiopProfile, ObjectReference};
use parking_lot::Mutex;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const ECHO_TYPE_ID: &str = "IDL:Test/Echo:1.0";
pub const ECHO_KEY: &[u8] = b"EchoPOA/echo";

/// Initialize logging for tests
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Servant used by most tests.
///
/// - `echo`: returns the payload
/// - `sleep`: waits for the big-endian u32 milliseconds in the payload, then echoes
/// - `context`: returns the value of the `key` call-context entry
/// - `generate`: returns the big-endian u32 number of pattern bytes
/// - anything else: BAD_OPERATION
#[derive(Default)]
pub struct TestServant;

#[async_trait]
impl ServantDispatcher for TestServant {
    async fn dispatch(&self, request: IncomingRequest) -> Result<Bytes, DispatchError> {
        match request.operation.as_str() {
            "echo" => Ok(request.payload),
            "sleep" => {
                tokio::time::sleep(Duration::from_millis(read_u32(&request.payload) as u64)).await;
                Ok(request.payload)
            }
            "context" => {
                // The task-local context and the request's copy must agree
                let scoped = CallContext::current().unwrap_or_default();
                if scoped != request.context {
                    return Err(DispatchError::System(SystemException::unknown()));
                }
                let value = scoped.get("key").map(|e| e.value.clone()).unwrap_or_default();
                Ok(Bytes::from(value))
            }
            "generate" => Ok(pattern_bytes(read_u32(&request.payload) as usize)),
            _ => Err(DispatchError::System(SystemException::bad_operation())),
        }
    }
}

fn read_u32(payload: &[u8]) -> u32 {
    payload
        .get(..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or(0)
}

pub fn u32_payload(value: u32) -> Bytes {
    Bytes::copy_from_slice(&value.to_be_bytes())
}

/// A server bound to an ephemeral local port
pub struct TestServer<D: ServantDispatcher> {
    pub addr: SocketAddr,
    pub server: Arc<GiopServer<D>>,
    handle: JoinHandle<giop::Result<()>>,
}

impl<D: ServantDispatcher> TestServer<D> {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl<D: ServantDispatcher> Drop for TestServer<D> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn start_server<D: ServantDispatcher>(dispatcher: D) -> TestServer<D> {
    start_server_with_config(dispatcher, GiopServerConfig::default()).await
}

pub async fn start_server_with_config<D: ServantDispatcher>(
    dispatcher: D,
    config: GiopServerConfig,
) -> TestServer<D> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(GiopServer::with_config(dispatcher, config));
    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move {
        running
            .run_listener(listener, std::future::pending())
            .await
    });
    TestServer {
        addr,
        server,
        handle,
    }
}

/// An endpoint nothing listens on: bind a port, then release it
pub async fn unreachable_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Endpoint::new(addr.ip().to_string(), addr.port())
}

/// Reference whose primary address is `primary`, with `alternates` attached
pub fn reference_with_alternates(primary: &Endpoint, alternates: &[Endpoint]) -> ObjectReference {
    let mut profile = InternetIiopProfile::new(
        GiopVersion::V1_2,
        primary.host.clone(),
        primary.port,
        Bytes::from_static(ECHO_KEY),
    );
    for alt in alternates {
        profile = profile.with_component(
            AlternateIiopAddressComponentData::new(alt.host.clone(), alt.port)
                .to_component(cdr::CdrContext::big_endian())
                .unwrap(),
        );
    }
    ObjectReference::from_iiop(ECHO_TYPE_ID, &profile).unwrap()
}

pub fn reference_to(endpoint: &Endpoint) -> ObjectReference {
    reference_with_alternates(endpoint, &[])
}

/// TCP connector that records every endpoint it is asked to reach
#[derive(Clone, Default)]
pub struct CountingConnector {
    attempts: Arc<Mutex<Vec<Endpoint>>>,
}

impl CountingConnector {
    pub fn attempts(&self) -> Vec<Endpoint> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<giop::BoxedStream> {
        self.attempts.lock().push(endpoint.clone());
        TcpConnector.connect(endpoint).await
    }
}

/// Generate deterministic pattern bytes
pub fn pattern_bytes(size: usize) -> Bytes {
    let mut data = BytesMut::with_capacity(size);
    for i in 0..size {
        data.put_u8((i % 251) as u8);
    }
    data.freeze()
}

/// Simple checksum for payload comparison
pub fn compute_checksum(data: &[u8]) -> u64 {
    data.iter()
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc.wrapping_add((b as u64).wrapping_mul(i as u64 + 1)))
}

/// Deterministic pseudo-random payloads
pub struct TestDataGenerator {
    state: u64,
}

impl TestDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self { state: seed | 1 }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    pub fn random_bytes(&mut self, size: usize) -> Bytes {
        (0..size).map(|_| self.next() as u8).collect::<Vec<u8>>().into()
    }
}

/// Success/failure/latency counters shared by concurrent tasks
#[derive(Default)]
pub struct ConcurrentStats {
    successes: AtomicU64,
    failures: AtomicU64,
    total_latency_us: AtomicU64,
}

impl ConcurrentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency: Duration) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_count(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn avg_latency(&self) -> Duration {
        let successes = self.success_count();
        if successes == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.total_latency_us.load(Ordering::Relaxed) / successes)
    }
}
