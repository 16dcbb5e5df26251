//! IIOP object references and remote invocation
//!
//! This crate sits on top of `giop` and adds the addressing side of IIOP:
//! interoperable object references, their profiles and components, and the
//! resolution of a reference to the endpoints a client should try.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                   OrbClient                   │
//! │    (forwards, exceptions, call context)       │
//! ├──────────────────────┬────────────────────────┤
//! │   EndpointResolver   │    PayloadMarshaler    │
//! │ (primary+alternates) │   (opaque arguments)   │
//! ├──────────────────────┴────────────────────────┤
//! │  ObjectReference / TaggedProfile / Component  │
//! ├───────────────────────────────────────────────┤
//! │          giop::ConnectionManager              │
//! │        (pooling, ordered failover)            │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use iiop::{ObjectReference, OrbClient, RawMarshaler};
//!
//! #[tokio::main]
//! async fn main() -> iiop::Result<()> {
//!     let target = ObjectReference::parse("corbaloc:iiop:1.2@primary:2809,:backup/Echo")?;
//!     let client = OrbClient::new();
//!     let reply = client
//!         .invoke(&target, "echo", &RawMarshaler::new(), &b"hello"[..])
//!         .await?;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod marshal;
pub mod resolver;
pub mod types;

pub use client::{OrbClient, OrbClientBuilder, DEFAULT_MAX_FORWARDS};
pub use marshal::{PayloadMarshaler, RawMarshaler};
pub use resolver::EndpointResolver;
pub use types::*;
