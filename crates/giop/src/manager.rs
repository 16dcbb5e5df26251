//! Connection manager
//!
//! Keeps at most one live connection per [`Endpoint`] and hands it out to
//! concurrent invocations. Acquisition walks the candidate endpoints in
//! order, reusing a healthy pooled connection or opening a new one, and
//! moves on to the next candidate when a connect is refused, fails or times
//! out.
//!
//! A connection that fails is evicted as soon as the failure is observed,
//! whether by a writer or by its reader task, so the next acquisition for
//! that endpoint opens a fresh one.

use crate::connection::{
    ConnectionSettings, Connector, FailureHook, GiopConnection, TcpConnector,
};
use crate::endpoint::Endpoint;
use crate::error::{GiopError, Result};
use crate::fragmentation::DEFAULT_MAX_FRAGMENT_SIZE;
use crate::giop::{GiopVersion, ReplyMessage, RequestMessage};
use crate::policy::{policy_type, PolicySet};
use crate::transport::DEFAULT_MAX_MESSAGE_SIZE;
use cdr::CdrContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Highest GIOP version sent; a target offering less gets its own
    pub giop_version: GiopVersion,
    /// Byte order used for outgoing messages
    pub byte_order: CdrContext,
    pub max_message_size: usize,
    pub max_fragment_size: usize,
    /// Used when no connect-timeout policy is installed
    pub connect_timeout: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            giop_version: GiopVersion::V1_2,
            byte_order: CdrContext::with_byte_order(cfg!(target_endian = "little")),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionManagerConfig {
    /// Version to speak to a target whose profile offers `offered`
    pub fn negotiate(&self, offered: GiopVersion) -> GiopVersion {
        offered.min(self.giop_version)
    }

    fn settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            giop_version: self.giop_version,
            cdr_context: self.byte_order,
            max_message_size: self.max_message_size,
            max_fragment_size: self.max_fragment_size,
        }
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub connections: usize,
    pub open_requests: usize,
    pub pending_replies: usize,
}

#[derive(Default)]
struct Pool {
    connections: Mutex<HashMap<Endpoint, Arc<GiopConnection>>>,
    connect_locks: Mutex<HashMap<Endpoint, Arc<tokio::sync::Mutex<()>>>>,
    next_connection_id: AtomicU64,
}

impl Pool {
    fn healthy(&self, endpoint: &Endpoint) -> Option<Arc<GiopConnection>> {
        let mut connections = self.connections.lock();
        let conn = Arc::clone(connections.get(endpoint)?);
        if conn.is_healthy() {
            return Some(conn);
        }
        let stale = connections.remove(endpoint);
        drop(connections);
        drop(stale);
        self.forget_connect_lock(endpoint);
        None
    }

    /// Remove the pooled connection for `endpoint` if it is still `id`.
    fn evict(&self, endpoint: &Endpoint, id: u64) -> bool {
        let removed = {
            let mut connections = self.connections.lock();
            let matches = connections.get(endpoint).map(|c| c.id()) == Some(id);
            if matches {
                connections.remove(endpoint)
            } else {
                None
            }
        };
        if removed.is_some() {
            debug!("Evicted connection to {}", endpoint);
            self.forget_connect_lock(endpoint);
        }
        removed.is_some()
    }

    fn connect_lock(&self, endpoint: &Endpoint) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.connect_locks.lock().entry(endpoint.clone()).or_default())
    }

    /// Drop the connect lock for `endpoint` unless a connect holds or awaits it.
    fn forget_connect_lock(&self, endpoint: &Endpoint) {
        let mut locks = self.connect_locks.lock();
        if locks.get(endpoint).map(Arc::strong_count) == Some(1) {
            locks.remove(endpoint);
        }
    }
}

/// Pool of client connections keyed by endpoint
pub struct ConnectionManager<C: Connector = TcpConnector> {
    connector: C,
    config: ConnectionManagerConfig,
    pool: Arc<Pool>,
}

impl ConnectionManager<TcpConnector> {
    pub fn new() -> Self {
        Self::with_connector(TcpConnector, ConnectionManagerConfig::default())
    }

    pub fn with_config(config: ConnectionManagerConfig) -> Self {
        Self::with_connector(TcpConnector, config)
    }
}

impl Default for ConnectionManager<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> ConnectionManager<C> {
    pub fn with_connector(connector: C, config: ConnectionManagerConfig) -> Self {
        Self {
            connector,
            config,
            pool: Arc::new(Pool::default()),
        }
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.config
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Get a usable connection to the first reachable candidate.
    ///
    /// At most `MAX_FAILOVER_ATTEMPTS` candidates are tried when that policy
    /// is installed; otherwise every candidate is. The returned connection
    /// counts one open request until it is handed back with [`release`].
    ///
    /// [`release`]: ConnectionManager::release
    pub async fn acquire(
        &self,
        endpoints: &[Endpoint],
        policies: &PolicySet,
    ) -> Result<Arc<GiopConnection>> {
        let limit = policies
            .count(policy_type::MAX_FAILOVER_ATTEMPTS)
            .map(|n| (n as usize).max(1))
            .unwrap_or(endpoints.len())
            .min(endpoints.len());
        let connect_timeout = policies
            .duration(policy_type::CONNECT_TIMEOUT)
            .unwrap_or(self.config.connect_timeout);

        let mut attempts = 0;
        let mut last_endpoint = None;
        for endpoint in endpoints.iter().take(limit) {
            attempts += 1;
            last_endpoint = Some(endpoint.clone());
            debug!(
                "Connection attempt {}/{} to {}",
                attempts, limit, endpoint
            );
            match self.connect(endpoint, connect_timeout).await {
                Ok(conn) => {
                    conn.checkout();
                    return Ok(conn);
                }
                Err(e) => debug!("Endpoint {} unusable: {}", endpoint, e),
            }
        }

        Err(GiopError::AllEndpointsUnreachable {
            attempts,
            last_endpoint,
        })
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<Arc<GiopConnection>> {
        if let Some(conn) = self.pool.healthy(endpoint) {
            trace!("Reusing pooled connection to {}", endpoint);
            return Ok(conn);
        }

        let lock = self.pool.connect_lock(endpoint);
        let result = {
            let _guard = lock.lock().await;
            self.open(endpoint, connect_timeout).await
        };
        drop(lock);
        if result.is_err() {
            self.pool.forget_connect_lock(endpoint);
        }
        result
    }

    /// Open and pool a connection; the caller holds the endpoint's connect lock.
    async fn open(
        &self,
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<Arc<GiopConnection>> {
        // Another caller may have connected while we waited.
        if let Some(conn) = self.pool.healthy(endpoint) {
            return Ok(conn);
        }

        let stream = match tokio::time::timeout(connect_timeout, self.connector.connect(endpoint))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(GiopError::CommunicationFailure {
                    endpoint: endpoint.clone(),
                    reason: format!("connect failed: {}", e),
                })
            }
            Err(_) => {
                return Err(GiopError::CommunicationFailure {
                    endpoint: endpoint.clone(),
                    reason: format!("connect timed out after {:?}", connect_timeout),
                })
            }
        };

        let id = self.pool.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let pool: Weak<Pool> = Arc::downgrade(&self.pool);
        let on_failure: FailureHook = Box::new(move |endpoint: &Endpoint, id: u64| {
            if let Some(pool) = pool.upgrade() {
                pool.evict(endpoint, id);
            }
        });
        let conn = Arc::new(GiopConnection::start_with_id(
            endpoint.clone(),
            id,
            stream,
            self.config.settings(),
            Some(on_failure),
        ));
        self.pool
            .connections
            .lock()
            .insert(endpoint.clone(), Arc::clone(&conn));
        debug!("Connected to {} (connection {})", endpoint, id);
        Ok(conn)
    }

    /// Hand a connection back after use; unhealthy ones are evicted.
    pub fn release(&self, conn: &Arc<GiopConnection>) {
        conn.checkin();
        if !conn.is_healthy() {
            self.evict(conn);
        }
    }

    /// Drop `conn` from the pool immediately.
    pub fn evict(&self, conn: &GiopConnection) -> bool {
        self.pool.evict(conn.endpoint(), conn.id())
    }

    /// Healthy pooled connection for `endpoint`, if any
    pub fn pooled(&self, endpoint: &Endpoint) -> Option<Arc<GiopConnection>> {
        self.pool.healthy(endpoint)
    }

    pub fn stats(&self) -> PoolStats {
        let connections = self.pool.connections.lock();
        connections.values().fold(
            PoolStats {
                connections: connections.len(),
                ..PoolStats::default()
            },
            |mut stats, conn| {
                stats.open_requests += conn.open_request_count();
                stats.pending_replies += conn.pending_replies();
                stats
            },
        )
    }

    /// Acquire a connection, send `request` in GIOP `version` and wait for
    /// its reply.
    ///
    /// An idempotent request that fails with `CommunicationFailure` is sent
    /// once more, with the candidate list rotated to start after the
    /// endpoint that failed.
    pub async fn invoke(
        &self,
        endpoints: &[Endpoint],
        request: RequestMessage,
        version: GiopVersion,
        idempotent: bool,
        policies: &PolicySet,
    ) -> Result<Option<ReplyMessage>> {
        self.invoke_with(endpoints, version, idempotent, policies, |_| {
            Ok::<_, GiopError>(request.clone())
        })
        .await
    }

    /// Like [`invoke`], but `build` makes the request for the connection it
    /// will be sent on, once per attempt.
    ///
    /// [`invoke`]: ConnectionManager::invoke
    pub async fn invoke_with<F, E>(
        &self,
        endpoints: &[Endpoint],
        version: GiopVersion,
        idempotent: bool,
        policies: &PolicySet,
        build: F,
    ) -> std::result::Result<Option<ReplyMessage>, E>
    where
        F: Fn(&GiopConnection) -> std::result::Result<RequestMessage, E>,
        E: From<GiopError>,
    {
        let request_timeout = policies.duration(policy_type::REQUEST_TIMEOUT);

        let conn = self.acquire(endpoints, policies).await?;
        let result = match build(&conn) {
            Ok(request) => Ok(conn.send_request(request, version, request_timeout).await),
            Err(e) => Err(e),
        };
        self.release(&conn);

        match result? {
            Err(GiopError::CommunicationFailure { endpoint, reason }) if idempotent => {
                let candidates = rotate_after(endpoints, &endpoint);
                debug!("Retrying after failure on {}: {}", endpoint, reason);
                let conn = self.acquire(&candidates, policies).await?;
                let result = match build(&conn) {
                    Ok(request) => Ok(conn.send_request(request, version, request_timeout).await),
                    Err(e) => Err(e),
                };
                self.release(&conn);
                Ok(result??)
            }
            other => Ok(other?),
        }
    }

    /// Send CloseConnection on every pooled connection and empty the pool.
    pub async fn close_all(&self) {
        let connections: Vec<Arc<GiopConnection>> =
            self.pool.connections.lock().drain().map(|(_, c)| c).collect();
        self.pool
            .connect_locks
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        for conn in connections {
            if let Err(e) = conn.close().await {
                debug!("Error closing connection to {}: {}", conn.endpoint(), e);
            }
        }
    }
}

/// `endpoints` starting just after `failed`, wrapping around.
fn rotate_after(endpoints: &[Endpoint], failed: &Endpoint) -> Vec<Endpoint> {
    let mut rotated = endpoints.to_vec();
    if let Some(index) = endpoints.iter().position(|e| e == failed) {
        rotated.rotate_left(index + 1);
    }
    rotated
}
