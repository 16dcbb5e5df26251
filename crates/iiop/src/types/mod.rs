//! Object reference types
//!
//! This module contains the addressing structures carried in IORs:
//! - Object references and their stringified forms (`IOR:`, `corbaloc:`,
//!   `iiop://`)
//! - Tagged profiles, including the Internet-IOP profile body
//! - Tagged components, including alternate IIOP addresses

mod component;
mod corbaloc;
mod error;
mod iiop_url;
mod ior;
mod profile;

// Re-export all types
pub use component::*;
pub use corbaloc::{Corbaloc, CorbalocAddress, DEFAULT_CORBALOC_PORT};
pub use error::*;
pub use iiop_url::{IiopUrl, DEFAULT_IIOP_URL_VERSION};
pub use ior::*;
pub use profile::*;
