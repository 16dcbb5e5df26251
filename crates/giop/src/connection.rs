//! Client-side GIOP connections
//!
//! A [`GiopConnection`] owns one byte stream to one endpoint. Writers share
//! the write half behind an async mutex; a single reader task owns the read
//! half and routes every Reply and LocateReply to the caller waiting on its
//! request id. Replies may therefore complete in any order.
//!
//! When the stream fails, or the peer sends CloseConnection or MessageError,
//! the connection turns unhealthy and every outstanding caller receives
//! `CommunicationFailure`.
//!
//! Each request carries its own GIOP version, so targets speaking different
//! minor versions can share one connection to the same endpoint. Code sets,
//! in contrast, are fixed per connection; replies are read in them.

use crate::codeset::CodeSetState;
use crate::endpoint::Endpoint;
use crate::error::{GiopError, Result};
use crate::giop::{
    CancelRequestMessage, GiopVersion, LocateReplyMessage, LocateRequestMessage, Message,
    ReplyMessage, RequestMessage, TargetAddress,
};
use crate::transport::GiopTransport;
use async_trait::async_trait;
use cdr::CdrContext;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// First request id handed out on a new connection
pub const FIRST_REQUEST_ID: u32 = 5;

/// Byte stream a connection can run over
pub trait GiopStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> GiopStream for T {}

pub type BoxedStream = Box<dyn GiopStream>;

/// Opens byte streams to endpoints
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedStream>;
}

/// Plain TCP connector
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

/// Settings a connection is opened with
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Version for connection-level messages until a request picks one
    pub giop_version: GiopVersion,
    pub cdr_context: CdrContext,
    pub max_message_size: usize,
    pub max_fragment_size: usize,
}

type Waiter = oneshot::Sender<Result<Message>>;
pub(crate) type FailureHook = Box<dyn Fn(&Endpoint, u64) + Send + Sync>;

/// State shared between the connection handle and its reader task
struct Shared {
    endpoint: Endpoint,
    id: u64,
    healthy: AtomicBool,
    pending: Mutex<HashMap<u32, Waiter>>,
    on_failure: Option<FailureHook>,
}

impl Shared {
    fn complete(&self, request_id: u32, message: Message) {
        match self.pending.lock().remove(&request_id) {
            Some(waiter) => {
                let _ = waiter.send(Ok(message));
            }
            None => debug!(
                "Discarding reply for request {} on {}: no waiter",
                request_id, self.endpoint
            ),
        }
    }

    /// Mark unusable and fail every outstanding request.
    fn fail(&self, reason: &str) {
        let was_healthy = self.healthy.swap(false, Ordering::SeqCst);
        let waiters: Vec<Waiter> = self.pending.lock().drain().map(|(_, w)| w).collect();
        if was_healthy {
            debug!(
                "Connection to {} failed: {} ({} requests outstanding)",
                self.endpoint,
                reason,
                waiters.len()
            );
            if let Some(hook) = &self.on_failure {
                hook(&self.endpoint, self.id);
            }
        }
        for waiter in waiters {
            let _ = waiter.send(Err(GiopError::CommunicationFailure {
                endpoint: self.endpoint.clone(),
                reason: reason.to_string(),
            }));
        }
    }
}

/// One client connection to a GIOP server
pub struct GiopConnection {
    shared: Arc<Shared>,
    settings: ConnectionSettings,
    writer: Arc<tokio::sync::Mutex<GiopTransport<WriteHalf<BoxedStream>>>>,
    next_request_id: AtomicU32,
    open_requests: AtomicUsize,
    /// Minor version of the last request written
    spoken_minor: AtomicU8,
    code_sets: CodeSetState,
    reader: JoinHandle<()>,
}

impl GiopConnection {
    /// Start a connection over an established stream.
    pub fn start(endpoint: Endpoint, stream: BoxedStream, settings: ConnectionSettings) -> Self {
        Self::start_with_id(endpoint, 0, stream, settings, None)
    }

    pub(crate) fn start_with_id(
        endpoint: Endpoint,
        id: u64,
        stream: BoxedStream,
        settings: ConnectionSettings,
        on_failure: Option<FailureHook>,
    ) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let shared = Arc::new(Shared {
            endpoint,
            id,
            healthy: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            on_failure,
        });
        let writer = Arc::new(tokio::sync::Mutex::new(GiopTransport::new(write_half)));
        let reader_transport =
            GiopTransport::new(read_half).with_max_message_size(settings.max_message_size);
        let reader = tokio::spawn(read_loop(
            reader_transport,
            Arc::clone(&shared),
            Arc::clone(&writer),
            settings,
        ));

        Self {
            shared,
            settings,
            writer,
            next_request_id: AtomicU32::new(FIRST_REQUEST_ID),
            open_requests: AtomicUsize::new(0),
            spoken_minor: AtomicU8::new(settings.giop_version.minor),
            code_sets: CodeSetState::default(),
            reader,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    pub(crate) fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// GIOP version of the most recent request on this connection
    pub fn spoken_version(&self) -> GiopVersion {
        GiopVersion::new(1, self.spoken_minor.load(Ordering::SeqCst))
    }

    /// Code sets of this connection, fixed by the first request
    pub fn code_sets(&self) -> &CodeSetState {
        &self.code_sets
    }

    pub fn is_healthy(&self) -> bool {
        self.shared.healthy.load(Ordering::SeqCst)
    }

    /// Number of callers currently holding this connection
    pub fn open_request_count(&self) -> usize {
        self.open_requests.load(Ordering::SeqCst)
    }

    /// Number of requests awaiting a reply
    pub fn pending_replies(&self) -> usize {
        self.shared.pending.lock().len()
    }

    pub(crate) fn checkout(&self) {
        self.open_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn checkin(&self) {
        let _ = self
            .open_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    /// Hand out the next request id.
    pub fn next_request_id(&self) -> Result<u32> {
        self.next_request_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
            .map_err(|_| GiopError::RequestIdsExhausted(self.endpoint().clone()))
    }

    fn ensure_healthy(&self) -> Result<()> {
        if self.is_healthy() {
            Ok(())
        } else {
            Err(self.failure("connection is no longer usable"))
        }
    }

    fn failure(&self, reason: impl Into<String>) -> GiopError {
        GiopError::CommunicationFailure {
            endpoint: self.endpoint().clone(),
            reason: reason.into(),
        }
    }

    async fn send(&self, message: &Message, version: GiopVersion) -> Result<()> {
        let frame = message.encode(version, self.settings.cdr_context)?;
        let result = {
            let mut writer = self.writer.lock().await;
            writer
                .write_message(&frame, self.settings.max_fragment_size)
                .await
        };
        match result {
            Ok(()) => Ok(()),
            Err(GiopError::Io(e)) => {
                let reason = format!("write failed: {}", e);
                self.shared.fail(&reason);
                Err(self.failure(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Register a waiter, send, and wait for the correlated answer.
    async fn round_trip(
        &self,
        request_id: u32,
        message: Message,
        version: GiopVersion,
        timeout: Option<Duration>,
    ) -> Result<Message> {
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(request_id, tx);
        // The reader may have failed the connection before the waiter landed.
        if !self.is_healthy() {
            self.shared.pending.lock().remove(&request_id);
            return Err(self.failure("connection is no longer usable"));
        }

        if let Err(e) = self.send(&message, version).await {
            self.shared.pending.lock().remove(&request_id);
            return Err(e);
        }

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.shared.pending.lock().remove(&request_id);
                    debug!(
                        "Request {} to {} timed out after {:?}",
                        request_id,
                        self.endpoint(),
                        limit
                    );
                    if let Err(e) = self
                        .send(
                            &Message::CancelRequest(CancelRequestMessage { request_id }),
                            version,
                        )
                        .await
                    {
                        trace!("CancelRequest for {} not sent: {}", request_id, e);
                    }
                    return Err(GiopError::Timeout {
                        endpoint: self.endpoint().clone(),
                        request_id,
                    });
                }
            },
            None => rx.await,
        };

        match outcome {
            Ok(result) => result,
            Err(_) => Err(self.failure("connection dropped while waiting for reply")),
        }
    }

    /// Send a request in GIOP `version` and wait for its reply.
    ///
    /// A fresh request id is assigned. Oneway requests return `None` as soon
    /// as they are written.
    pub async fn send_request(
        &self,
        mut request: RequestMessage,
        version: GiopVersion,
        timeout: Option<Duration>,
    ) -> Result<Option<ReplyMessage>> {
        self.ensure_healthy()?;
        let request_id = self.next_request_id()?;
        request.request_id = request_id;
        self.spoken_minor.store(version.minor, Ordering::SeqCst);

        debug!(
            "Sending request: id={}, operation={}, endpoint={}, giop={}, body_len={}",
            request_id,
            request.operation,
            self.endpoint(),
            version,
            request.body.len()
        );

        if !request.response_expected {
            self.send(&Message::Request(request), version).await?;
            return Ok(None);
        }

        match self
            .round_trip(request_id, Message::Request(request), version, timeout)
            .await?
        {
            Message::Reply(mut reply) => {
                reply.body_position.context = self
                    .code_sets
                    .current()
                    .apply(reply.body_position.context);
                trace!(
                    "Reply for request {}: status={:?}, body_len={}",
                    request_id,
                    reply.reply_status,
                    reply.body.len()
                );
                Ok(Some(reply))
            }
            other => Err(GiopError::UnexpectedMessage(other.message_type())),
        }
    }

    /// Ask the server whether it hosts `target`.
    pub async fn locate(
        &self,
        target: TargetAddress,
        version: GiopVersion,
        timeout: Option<Duration>,
    ) -> Result<LocateReplyMessage> {
        self.ensure_healthy()?;
        let request_id = self.next_request_id()?;
        self.spoken_minor.store(version.minor, Ordering::SeqCst);
        let message = Message::LocateRequest(LocateRequestMessage { request_id, target });
        match self.round_trip(request_id, message, version, timeout).await? {
            Message::LocateReply(mut reply) => {
                reply.body_position.context = self
                    .code_sets
                    .current()
                    .apply(reply.body_position.context);
                Ok(reply)
            }
            other => Err(GiopError::UnexpectedMessage(other.message_type())),
        }
    }

    /// Abandon a request. Best effort: a late reply is discarded.
    pub async fn cancel(&self, request_id: u32) -> Result<()> {
        self.shared.pending.lock().remove(&request_id);
        self.send(
            &Message::CancelRequest(CancelRequestMessage { request_id }),
            self.spoken_version(),
        )
        .await
    }

    /// Send CloseConnection and shut the connection down.
    pub async fn close(&self) -> Result<()> {
        if !self.is_healthy() {
            return Ok(());
        }
        let frame = Message::CloseConnection
            .encode(self.spoken_version(), self.settings.cdr_context)?;
        let result = {
            let mut writer = self.writer.lock().await;
            match writer.write_frame(&frame).await {
                Ok(()) => writer.shutdown().await,
                Err(e) => Err(e),
            }
        };
        self.shared.fail("connection closed locally");
        self.reader.abort();
        result
    }
}

impl Drop for GiopConnection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for GiopConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GiopConnection")
            .field("endpoint", &self.shared.endpoint)
            .field("healthy", &self.is_healthy())
            .field("open_requests", &self.open_request_count())
            .finish()
    }
}

async fn read_loop(
    mut transport: GiopTransport<ReadHalf<BoxedStream>>,
    shared: Arc<Shared>,
    writer: Arc<tokio::sync::Mutex<GiopTransport<WriteHalf<BoxedStream>>>>,
    settings: ConnectionSettings,
) {
    let mut peer_version = settings.giop_version;
    loop {
        let message = match transport.read_message().await {
            Ok(frame) => {
                peer_version = frame.header.version;
                Message::decode(&frame)
            }
            Err(e) => Err(e),
        };

        match message {
            Ok(Message::Reply(reply)) => shared.complete(reply.request_id, Message::Reply(reply)),
            Ok(Message::LocateReply(reply)) => {
                shared.complete(reply.request_id, Message::LocateReply(reply))
            }
            Ok(Message::CloseConnection) => {
                shared.fail("peer sent CloseConnection");
                return;
            }
            Ok(Message::MessageError) => {
                shared.fail("peer sent MessageError");
                return;
            }
            Ok(Message::CancelRequest(cancel)) => {
                trace!(
                    "Ignoring CancelRequest {} on client connection to {}",
                    cancel.request_id,
                    shared.endpoint
                );
            }
            Ok(other) => {
                warn!(
                    "Unexpected {:?} on client connection to {}, answering with MessageError",
                    other.message_type(),
                    shared.endpoint
                );
                send_message_error(&writer, peer_version, settings).await;
            }
            Err(GiopError::ConnectionClosed) => {
                shared.fail("connection closed by peer");
                return;
            }
            Err(GiopError::Io(e)) => {
                shared.fail(&format!("read failed: {}", e));
                return;
            }
            Err(e) => {
                warn!("Protocol error from {}: {}", shared.endpoint, e);
                send_message_error(&writer, peer_version, settings).await;
                shared.fail(&e.to_string());
                return;
            }
        }
    }
}

async fn send_message_error<W: AsyncWrite + Unpin>(
    writer: &tokio::sync::Mutex<GiopTransport<W>>,
    version: GiopVersion,
    settings: ConnectionSettings,
) {
    let frame = match Message::MessageError.encode(version, settings.cdr_context) {
        Ok(frame) => frame,
        Err(_) => return,
    };
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_frame(&frame).await {
        trace!("MessageError not sent: {}", e);
    }
}
