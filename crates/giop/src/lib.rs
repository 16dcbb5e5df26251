//! GIOP (General Inter-ORB Protocol) client and server implementation
//!
//! This crate frames and dispatches GIOP 1.0, 1.1 and 1.2 messages over any
//! reliable byte stream, with CDR-encoded bodies from the `cdr` crate.
//!
//! # Features
//!
//! - All eight GIOP message types, in both byte orders
//! - Fragmentation and reassembly (GIOP 1.1 and 1.2)
//! - Pooled client connections with ordered endpoint failover
//! - Replies correlated by request id, completing in any order
//! - Per-call context carried in a service context
//! - Per-connection code-set negotiation
//! - Typed per-call policies (timeouts, failover limits)
//! - Async server using Tokio
//!
//! # Example
//!
//! ## Server
//!
//! ```no_run
//! use async_trait::async_trait;
//! use bytes::Bytes;
//! use giop::{DispatchError, GiopServer, IncomingRequest, ServantDispatcher};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ServantDispatcher for Echo {
//!     async fn dispatch(&self, request: IncomingRequest) -> Result<Bytes, DispatchError> {
//!         Ok(request.payload)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = GiopServer::new(Echo);
//!     server.run("127.0.0.1:2809".parse().unwrap()).await.unwrap();
//! }
//! ```
//!
//! ## Client
//!
//! ```no_run
//! use bytes::Bytes;
//! use giop::{ConnectionManager, Endpoint, GiopVersion, PolicySet, RequestMessage};
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = ConnectionManager::new();
//!     let endpoints = [Endpoint::new("primary", 2809), Endpoint::new("backup", 2809)];
//!     let request = RequestMessage::new(Bytes::from_static(b"key"), "echo", Bytes::from("hi"));
//!
//!     let reply = manager
//!         .invoke(&endpoints, request, GiopVersion::V1_2, true, &PolicySet::new())
//!         .await
//!         .unwrap()
//!         .unwrap();
//!     assert_eq!(reply.body.as_ref(), b"hi");
//! }
//! ```

pub mod error;
pub mod endpoint;

// GIOP protocol modules
pub mod fragmentation;
pub mod giop;
pub mod transport;

// Client and server
pub mod connection;
pub mod manager;
pub mod server;

// Invocation context
pub mod codeset;
pub mod context;
pub mod policy;

// Re-export error types
pub use error::{GiopError, Result};

pub use endpoint::Endpoint;

// GIOP exports
pub use giop::{
    addressing,
    AddressedProfile,
    system_exception_id,
    BodyPosition,
    CancelRequestMessage,
    CompletionStatus,
    FragmentMessage,
    GiopFlags,
    GiopFrame,
    GiopHeader,
    GiopVersion,
    LocateReplyMessage,
    LocateRequestMessage,
    LocateStatus,
    Message,
    MessageType,
    ReplyMessage,
    ReplyStatus,
    RequestMessage,
    ServiceContext,
    SystemException,
    TargetAddress,
    // Constants
    GIOP_MAGIC,
};
pub use fragmentation::{
    FragmentAssembler, FragmentGenerator, DEFAULT_MAX_FRAGMENT_SIZE, MIN_FRAGMENT_SIZE,
};
pub use transport::{GiopTransport, DEFAULT_MAX_MESSAGE_SIZE};

pub use connection::{
    BoxedStream, ConnectionSettings, Connector, GiopConnection, GiopStream, TcpConnector,
    FIRST_REQUEST_ID,
};
pub use manager::{ConnectionManager, ConnectionManagerConfig, PoolStats};
pub use server::{
    DispatchError, GiopServer, GiopServerConfig, IncomingRequest, ServantDispatcher, ServerStats,
    ServerStatsSnapshot,
};

pub use codeset::{CodeSetContext, CodeSetState, CODE_SETS_SERVICE_ID};
pub use context::{CallContext, ContextElement, CALL_CONTEXT_SERVICE_ID};
pub use policy::{
    policy_type, ConnectTimeoutPolicy, MaxFailoverAttemptsPolicy, Policy, PolicySet, PolicyValue,
    RequestTimeoutPolicy, UseAlternateAddressesPolicy,
};
