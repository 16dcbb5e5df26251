//! GIOP server
//!
//! Accepts connections and hands every incoming Request to a
//! [`ServantDispatcher`].
//!
//! # Scalability Features
//!
//! - Each connection handled in a separate Tokio task
//! - Each request dispatched in its own task, so slow operations do not
//!   hold up the connection
//! - Semaphore-based connection limiting
//! - Server statistics tracking
//! - Graceful shutdown support
//!
//! Replies go out in the GIOP version and byte order of the request they
//! answer. The first request on a connection fixes its code sets.

use crate::codeset::{CodeSetContext, CodeSetState};
use crate::context::CallContext;
use crate::error::{GiopError, Result};
use crate::fragmentation::DEFAULT_MAX_FRAGMENT_SIZE;
use crate::giop::{
    addressing, BodyPosition, GiopHeader, GiopVersion, LocateReplyMessage, LocateRequestMessage,
    LocateStatus, Message, ReplyMessage, ReplyStatus, RequestMessage, ServiceContext,
    SystemException,
};
use crate::transport::{GiopTransport, DEFAULT_MAX_MESSAGE_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use cdr::{CdrContext, CdrReader, CdrWriter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{debug, info, trace, warn};

/// Request as seen by a servant
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    pub request_id: u32,
    pub operation: String,
    pub object_key: Bytes,
    /// Marshaled arguments, opaque to the server
    pub payload: Bytes,
    pub payload_position: BodyPosition,
    pub context: CallContext,
    pub service_contexts: Vec<ServiceContext>,
    pub response_expected: bool,
    pub version: GiopVersion,
}

impl IncomingRequest {
    /// Byte order and code sets of the request, which the reply must use too
    pub fn cdr_context(&self) -> CdrContext {
        self.payload_position.context
    }

    /// Reader over the payload, positioned for correct alignment
    pub fn payload_reader(&self) -> CdrReader {
        CdrReader::with_position(
            self.payload.clone(),
            self.payload_position.context,
            self.payload_position.offset,
        )
    }

    /// Writer for a reply body. Reply bodies start 8-aligned in every GIOP
    /// version, so encoding from offset zero keeps alignment intact.
    pub fn reply_writer(&self) -> CdrWriter {
        body_writer(self.cdr_context())
    }
}

/// Failure outcomes of a dispatch
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    /// USER_EXCEPTION reply; `body` follows the repository id
    #[error("user exception {repository_id}")]
    User { repository_id: String, body: Bytes },

    #[error("system exception {0}")]
    System(SystemException),

    /// LOCATION_FORWARD reply carrying an object reference encoded in the
    /// request's byte order
    #[error("location forward")]
    Forward(Bytes),
}

/// Executes requests on behalf of the server
#[async_trait]
pub trait ServantDispatcher: Send + Sync + 'static {
    async fn dispatch(&self, request: IncomingRequest) -> std::result::Result<Bytes, DispatchError>;

    /// Whether an object with this key lives here
    async fn locate(&self, _object_key: &[u8]) -> bool {
        true
    }
}

/// GIOP server configuration
#[derive(Debug, Clone)]
pub struct GiopServerConfig {
    pub max_connections: usize,
    pub max_message_size: usize,
    pub max_fragment_size: usize,
}

impl Default for GiopServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10000,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_fragment_size: DEFAULT_MAX_FRAGMENT_SIZE,
        }
    }
}

/// Server statistics
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_accepted: AtomicU64,
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub requests_received: AtomicU64,
    pub requests_processed: AtomicU64,
    pub requests_failed: AtomicU64,
    pub requests_cancelled: AtomicU64,
}

impl ServerStats {
    pub fn snapshot(&self) -> ServerStatsSnapshot {
        ServerStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_processed: self.requests_processed.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            requests_cancelled: self.requests_cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of server statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub requests_received: u64,
    pub requests_processed: u64,
    pub requests_failed: u64,
    pub requests_cancelled: u64,
}

type SharedWriter<S> = Arc<tokio::sync::Mutex<GiopTransport<WriteHalf<S>>>>;

/// GIOP server
pub struct GiopServer<D: ServantDispatcher> {
    dispatcher: Arc<D>,
    config: GiopServerConfig,
    stats: Arc<ServerStats>,
}

impl<D: ServantDispatcher> GiopServer<D> {
    pub fn new(dispatcher: D) -> Self {
        Self::with_config(dispatcher, GiopServerConfig::default())
    }

    pub fn with_config(dispatcher: D, config: GiopServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            config,
            stats: Arc::new(ServerStats::default()),
        }
    }

    /// Get server statistics
    pub fn stats(&self) -> &Arc<ServerStats> {
        &self.stats
    }

    pub fn config(&self) -> &GiopServerConfig {
        &self.config
    }

    /// Run the server on the given address
    pub async fn run(&self, addr: SocketAddr) -> Result<()> {
        self.run_until(addr, std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F: Future<Output = ()>>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.run_listener(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// completes, then wait for open connections to finish.
    pub async fn run_listener<F: Future<Output = ()>>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<()> {
        info!(
            "GIOP server listening on {} (max_connections: {})",
            listener.local_addr()?,
            self.config.max_connections
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Server shutting down gracefully");
                    let _ = semaphore.acquire_many(self.config.max_connections as u32).await;
                    info!("All connections closed");
                    return Ok(());
                }

                result = listener.accept() => {
                    let (stream, peer_addr) = result?;

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            self.stats.connections_rejected.fetch_add(1, Ordering::Relaxed);
                            warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                            drop(stream);
                            continue;
                        }
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not disable Nagle for {}: {}", peer_addr, e);
                    }

                    self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    debug!("Accepted connection from {}", peer_addr);

                    let connection = self.connection_handler();
                    tokio::spawn(async move {
                        let _permit = permit;
                        match connection.serve(stream).await {
                            Ok(()) => debug!("Connection closed normally from {}", peer_addr),
                            Err(e) => warn!("Connection error from {}: {}", peer_addr, e),
                        }
                    });
                }
            }
        }
    }

    /// Serve one already established connection until it closes.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.stats.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.connection_handler().serve(stream).await
    }

    fn connection_handler(&self) -> ConnectionHandler<D> {
        ConnectionHandler {
            dispatcher: Arc::clone(&self.dispatcher),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            code_sets: CodeSetState::default(),
        }
    }
}

/// Per-connection state
struct ConnectionHandler<D> {
    dispatcher: Arc<D>,
    config: GiopServerConfig,
    stats: Arc<ServerStats>,
    in_flight: Arc<Mutex<HashMap<u32, AbortHandle>>>,
    code_sets: CodeSetState,
}

impl<D: ServantDispatcher> ConnectionHandler<D> {
    async fn serve<S>(self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.stats.connections_active.fetch_add(1, Ordering::Relaxed);
        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader =
            GiopTransport::new(read_half).with_max_message_size(self.config.max_message_size);
        let writer: SharedWriter<S> = Arc::new(tokio::sync::Mutex::new(GiopTransport::new(write_half)));
        // Version and byte order for MessageError; the last ones the peer used
        let mut peer = (GiopVersion::V1_2, CdrContext::default());

        let result = loop {
            let decoded = match reader.read_message().await {
                Ok(frame) => {
                    peer = (frame.header.version, frame.header.context());
                    Message::decode(&frame).map(|message| (frame.header, message))
                }
                Err(e) => Err(e),
            };
            let (header, message) = match decoded {
                Ok(decoded) => decoded,
                Err(GiopError::ConnectionClosed) => break Ok(()),
                Err(GiopError::Io(e)) => break Err(GiopError::Io(e)),
                Err(e) => {
                    warn!("Malformed message from peer: {}", e);
                    self.send_message_error(&writer, peer).await;
                    break Err(e);
                }
            };

            match message {
                Message::Request(request) => {
                    self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
                    self.spawn_request(header, request, &writer);
                }
                Message::LocateRequest(locate) => {
                    self.stats.requests_received.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = self.answer_locate(header, locate, &writer).await {
                        break Err(e);
                    }
                }
                Message::CancelRequest(cancel) => {
                    if let Some(task) = self.in_flight.lock().remove(&cancel.request_id) {
                        task.abort();
                        self.stats.requests_cancelled.fetch_add(1, Ordering::Relaxed);
                        debug!("Cancelled request {}", cancel.request_id);
                    }
                }
                Message::CloseConnection => {
                    debug!("Peer sent CloseConnection");
                    break Ok(());
                }
                Message::MessageError => break Err(GiopError::MessageError),
                other => {
                    warn!("Unexpected {:?} on server connection", other.message_type());
                    self.send_message_error(&writer, peer).await;
                    break Err(GiopError::UnexpectedMessage(other.message_type()));
                }
            }
        };

        for (_, task) in self.in_flight.lock().drain() {
            task.abort();
        }
        self.stats.connections_active.fetch_sub(1, Ordering::Relaxed);
        result
    }

    fn spawn_request<S>(&self, header: GiopHeader, request: RequestMessage, writer: &SharedWriter<S>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let request_id = request.request_id;
        let response_expected = request.response_expected;
        let version = header.version;
        let code_sets = self.code_sets_for(&request);
        let ctx = match &code_sets {
            Ok(sets) => sets.apply(header.context()),
            Err(_) => header.context(),
        };
        debug!(
            "Received request: id={}, operation={}, body_len={}",
            request_id,
            request.operation,
            request.body.len()
        );

        let dispatcher = Arc::clone(&self.dispatcher);
        let stats = Arc::clone(&self.stats);
        let in_flight = Arc::clone(&self.in_flight);
        let writer = Arc::clone(writer);
        let max_fragment_size = self.config.max_fragment_size;

        // Held across spawn so the task cannot finish before it is registered.
        let mut tasks = self.in_flight.lock();
        let task = tokio::spawn(async move {
            let admission = match code_sets {
                Ok(sets) => incoming_request(request, version, sets),
                Err(exception) => {
                    system_exception_reply(request_id, &exception, ctx).map(Admission::Answer)
                }
            };
            let reply = match admission {
                Ok(Admission::Dispatch(incoming)) => {
                    let context = incoming.context.clone();
                    let outcome = context.scope(dispatcher.dispatch(incoming)).await;
                    match &outcome {
                        Ok(_) => stats.requests_processed.fetch_add(1, Ordering::Relaxed),
                        Err(_) => stats.requests_failed.fetch_add(1, Ordering::Relaxed),
                    };
                    reply_for(request_id, outcome, ctx)
                }
                Ok(Admission::Answer(reply)) => {
                    stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                    Ok(reply)
                }
                Err(e) => {
                    stats.requests_failed.fetch_add(1, Ordering::Relaxed);
                    Err(e)
                }
            };
            in_flight.lock().remove(&request_id);

            if !response_expected {
                return;
            }
            let written = match reply {
                Ok(reply) => write_message(&writer, Message::Reply(reply), version, ctx, max_fragment_size).await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                warn!("Failed to send reply for request {}: {}", request_id, e);
            }
        });
        tasks.insert(request_id, task.abort_handle());
    }

    async fn answer_locate<S>(
        &self,
        header: GiopHeader,
        locate: LocateRequestMessage,
        writer: &SharedWriter<S>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let ctx = header.context();
        let reply = match locate.target.object_key() {
            Some(key) => {
                let status = if self.dispatcher.locate(key).await {
                    LocateStatus::ObjectHere
                } else {
                    LocateStatus::UnknownObject
                };
                LocateReplyMessage::new(locate.request_id, status)
            }
            None => {
                let mut reply =
                    LocateReplyMessage::new(locate.request_id, LocateStatus::LocNeedsAddressingMode);
                reply.body = key_addr_disposition(ctx)?;
                reply
            }
        };
        trace!(
            "LocateRequest {} answered with {:?}",
            locate.request_id,
            reply.locate_status
        );
        self.stats.requests_processed.fetch_add(1, Ordering::Relaxed);
        write_message(
            writer,
            Message::LocateReply(reply),
            header.version,
            ctx,
            self.config.max_fragment_size,
        )
        .await
    }

    /// Code sets for `request`. The first request fixes them, to the ones
    /// it announces or to the defaults.
    fn code_sets_for(
        &self,
        request: &RequestMessage,
    ) -> std::result::Result<CodeSetContext, SystemException> {
        if self.code_sets.is_established() {
            return Ok(self.code_sets.current());
        }
        match CodeSetContext::from_service_contexts(&request.service_contexts) {
            Ok(Some(sets)) if !sets.is_supported() => {
                warn!(
                    "Request {} announces unsupported code sets {:#010x}/{:#010x}",
                    request.request_id, sets.char_data, sets.wchar_data
                );
                Err(SystemException::codeset_incompatible())
            }
            Ok(proposed) => {
                let (sets, _) = self.code_sets.establish(proposed);
                debug!(
                    "Code sets {:#010x}/{:#010x} in force",
                    sets.char_data, sets.wchar_data
                );
                Ok(sets)
            }
            Err(e) => {
                warn!("Undecodable code sets on request {}: {}", request.request_id, e);
                Err(SystemException::marshal())
            }
        }
    }

    async fn send_message_error<S>(&self, writer: &SharedWriter<S>, peer: (GiopVersion, CdrContext))
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (version, ctx) = peer;
        let frame = match Message::MessageError.encode(version, ctx) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("MessageError not encoded: {}", e);
                return;
            }
        };
        if let Err(e) = writer.lock().await.write_frame(&frame).await {
            trace!("MessageError not sent: {}", e);
        }
    }
}

/// What becomes of a decoded Request
enum Admission {
    Dispatch(IncomingRequest),
    /// Answered without reaching the servant
    Answer(ReplyMessage),
}

/// Turn a decoded Request into what the servant sees, or the reply that
/// answers it right away.
fn incoming_request(
    request: RequestMessage,
    version: GiopVersion,
    code_sets: CodeSetContext,
) -> Result<Admission> {
    let ctx = code_sets.apply(request.body_position.context);
    let Some(object_key) = request.target.object_key().cloned() else {
        debug!(
            "Request {} addressed by disposition {}, asking for an object key",
            request.request_id,
            request.target.discriminator()
        );
        return Ok(Admission::Answer(ReplyMessage::new(
            request.request_id,
            ReplyStatus::NeedsAddressingMode,
            key_addr_disposition(ctx)?,
        )));
    };
    let context = match CallContext::from_service_contexts(&request.service_contexts) {
        Ok(context) => context,
        Err(e) => {
            warn!("Undecodable call context on request {}: {}", request.request_id, e);
            return system_exception_reply(request.request_id, &SystemException::marshal(), ctx)
                .map(Admission::Answer);
        }
    };
    Ok(Admission::Dispatch(IncomingRequest {
        request_id: request.request_id,
        operation: request.operation,
        object_key,
        payload: request.body,
        payload_position: BodyPosition {
            context: ctx,
            ..request.body_position
        },
        context,
        service_contexts: request.service_contexts,
        response_expected: request.response_expected,
        version,
    }))
}

// Reply bodies built here start 8-aligned: the service context list is empty.
fn body_writer(ctx: CdrContext) -> CdrWriter {
    CdrWriter::with_position(ctx, 0)
}

fn key_addr_disposition(ctx: CdrContext) -> Result<Bytes> {
    let mut w = body_writer(ctx);
    w.write(&addressing::KEY_ADDR)?;
    Ok(w.into_bytes())
}

fn system_exception_body(exception: &SystemException, ctx: CdrContext) -> Result<Bytes> {
    let mut w = body_writer(ctx);
    w.write(exception)?;
    Ok(w.into_bytes())
}

fn system_exception_reply(
    request_id: u32,
    exception: &SystemException,
    ctx: CdrContext,
) -> Result<ReplyMessage> {
    Ok(ReplyMessage::new(
        request_id,
        ReplyStatus::SystemException,
        system_exception_body(exception, ctx)?,
    ))
}

fn reply_for(
    request_id: u32,
    outcome: std::result::Result<Bytes, DispatchError>,
    ctx: CdrContext,
) -> Result<ReplyMessage> {
    let (status, body) = match outcome {
        Ok(body) => (ReplyStatus::NoException, body),
        Err(DispatchError::User {
            repository_id,
            body,
        }) => {
            let mut w = body_writer(ctx);
            w.write(repository_id.as_str())?;
            w.write_octets(&body);
            (ReplyStatus::UserException, w.into_bytes())
        }
        Err(DispatchError::System(exception)) => (
            ReplyStatus::SystemException,
            system_exception_body(&exception, ctx)?,
        ),
        Err(DispatchError::Forward(reference)) => (ReplyStatus::LocationForward, reference),
    };
    Ok(ReplyMessage::new(request_id, status, body))
}

async fn write_message<S>(
    writer: &SharedWriter<S>,
    message: Message,
    version: GiopVersion,
    ctx: CdrContext,
    max_fragment_size: usize,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let frame = message.encode(version, ctx)?;
    writer
        .lock()
        .await
        .write_message(&frame, max_fragment_size)
        .await
}
