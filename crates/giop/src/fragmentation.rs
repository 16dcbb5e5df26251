//! GIOP message fragmentation
//!
//! A message larger than the fragment limit goes out as the original
//! message with the more-fragments flag set, carrying the first part of the
//! body, followed by `Fragment` messages carrying the rest. The last one
//! clears the flag.
//!
//! # Fragment Structure
//!
//! ```text
//! GIOP 1.2 (interleaving allowed, correlated by request id)
//! ├── Request/Reply/LocateRequest/LocateReply, flags |= MORE_FRAGMENTS
//! │     body[..n]  (starts with the request id)
//! ├── Fragment, flags |= MORE_FRAGMENTS
//! │     request id (4 bytes) + body[n..m]
//! └── Fragment
//!       request id (4 bytes) + body[m..]
//!
//! GIOP 1.1 (one fragmented message at a time per connection)
//! ├── original message, flags |= MORE_FRAGMENTS, body[..n]
//! └── Fragment messages, raw continuation bytes
//! ```
//!
//! Every fragment except the last is a multiple of 8 bytes long, header
//! included, so the continuation keeps the alignment of the original body.

use crate::error::{GiopError, Result};
use crate::giop::{GiopFrame, GiopHeader, MessageType};
use crate::transport::DEFAULT_MAX_MESSAGE_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Smallest fragment limit honoured by the generator
pub const MIN_FRAGMENT_SIZE: usize = 32;

/// Default fragment limit for outgoing messages
pub const DEFAULT_MAX_FRAGMENT_SIZE: usize = 65536;

/// Fragment generator for splitting outgoing messages.
pub struct FragmentGenerator;

impl FragmentGenerator {
    /// Usable fragment size for a limit: at least [`MIN_FRAGMENT_SIZE`],
    /// rounded down to a multiple of 8.
    pub fn effective_limit(max_fragment_size: usize) -> usize {
        max_fragment_size.max(MIN_FRAGMENT_SIZE) & !7
    }

    /// Split an encoded message into frames no longer than the limit.
    ///
    /// Returns the frame unchanged when it already fits.
    pub fn fragment(frame: &GiopFrame, max_fragment_size: usize) -> Result<Vec<GiopFrame>> {
        let limit = Self::effective_limit(max_fragment_size);
        if frame.wire_len() <= limit {
            return Ok(vec![frame.clone()]);
        }

        let version = frame.header.version;
        if !version.supports_fragments() {
            return Err(GiopError::FragmentationUnsupported {
                major: version.major,
                minor: version.minor,
            });
        }
        let message_type = frame.header.message_type;
        if !message_type.may_fragment() || message_type == MessageType::Fragment {
            return Err(GiopError::FragmentNotAllowed(message_type));
        }

        let body = &frame.body;
        let first_len = limit - GiopHeader::SIZE;

        let mut first_header = frame.header;
        first_header.flags.set_more_fragments(true);
        let mut frames = vec![GiopFrame::new(first_header, body.slice(..first_len))?];

        // The first body already holds the request id in this byte order.
        let id_prefix: Bytes = if version.is_1_2() {
            body.slice(..4)
        } else {
            Bytes::new()
        };
        let chunk_len = limit - GiopHeader::SIZE - id_prefix.len();

        let mut offset = first_len;
        while offset < body.len() {
            let end = (offset + chunk_len).min(body.len());

            let mut fragment_body = BytesMut::with_capacity(id_prefix.len() + end - offset);
            fragment_body.put_slice(&id_prefix);
            fragment_body.put_slice(&body[offset..end]);

            let mut header =
                GiopHeader::new(version, frame.header.context(), MessageType::Fragment);
            header.flags.set_more_fragments(end < body.len());
            frames.push(GiopFrame::new(header, fragment_body.freeze())?);

            offset = end;
        }

        trace!(
            "Split {:?} of {} bytes into {} fragments",
            message_type,
            frame.wire_len(),
            frames.len()
        );
        Ok(frames)
    }
}

struct PartialMessage {
    header: GiopHeader,
    body: BytesMut,
    fragments: usize,
}

/// Reassembles fragmented messages arriving on one connection.
///
/// GIOP 1.2 fragments are correlated by the request id that opens the first
/// message body and every `Fragment` body; GIOP 1.1 allows a single
/// fragmented message in flight.
pub struct FragmentAssembler {
    max_message_size: usize,
    by_request_id: HashMap<u32, PartialMessage>,
    current: Option<PartialMessage>,
}

impl FragmentAssembler {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            by_request_id: HashMap::new(),
            current: None,
        }
    }

    /// Number of messages still waiting for fragments
    pub fn pending(&self) -> usize {
        self.by_request_id.len() + usize::from(self.current.is_some())
    }

    /// Drop all incomplete messages
    pub fn reset(&mut self) {
        self.by_request_id.clear();
        self.current = None;
    }

    fn slot(&mut self, key: Option<u32>) -> Option<&mut PartialMessage> {
        match key {
            Some(id) => self.by_request_id.get_mut(&id),
            None => self.current.as_mut(),
        }
    }

    fn take(&mut self, key: Option<u32>) -> Option<PartialMessage> {
        match key {
            Some(id) => self.by_request_id.remove(&id),
            None => self.current.take(),
        }
    }

    /// Feed one physical frame.
    ///
    /// Returns the complete logical message once its last fragment has
    /// arrived, or the frame itself when it was never fragmented.
    pub fn push(&mut self, frame: GiopFrame) -> Result<Option<GiopFrame>> {
        let header = frame.header;
        let version = header.version;

        if header.message_type == MessageType::Fragment {
            if !version.supports_fragments() {
                return Err(GiopError::FragmentationUnsupported {
                    major: version.major,
                    minor: version.minor,
                });
            }
            let (key, payload) = if version.is_1_2() {
                (Some(frame.leading_request_id()?), frame.body.slice(4..))
            } else {
                (None, frame.body.clone())
            };

            let max = self.max_message_size;
            let total = {
                let partial = self
                    .slot(key)
                    .ok_or(GiopError::UnexpectedFragment { request_id: key })?;
                partial.body.extend_from_slice(&payload);
                partial.fragments += 1;
                partial.body.len()
            };
            if total > max {
                self.take(key);
                return Err(GiopError::MessageTooLarge { size: total, max });
            }

            trace!(
                "Received fragment: request_id={:?}, payload={}, more={}",
                key,
                payload.len(),
                header.flags.has_more_fragments()
            );

            if header.flags.has_more_fragments() {
                return Ok(None);
            }

            let partial = self
                .take(key)
                .ok_or(GiopError::UnexpectedFragment { request_id: key })?;
            let mut complete_header = partial.header;
            complete_header.flags.set_more_fragments(false);
            debug!(
                "Reassembled {:?}: request_id={:?}, {} fragments, {} bytes",
                complete_header.message_type,
                key,
                partial.fragments,
                partial.body.len()
            );
            return GiopFrame::new(complete_header, partial.body.freeze()).map(Some);
        }

        if !header.flags.has_more_fragments() {
            return Ok(Some(frame));
        }

        // First part of a fragmented message
        let key = if version.is_1_2() {
            Some(frame.leading_request_id()?)
        } else {
            None
        };
        let partial = PartialMessage {
            header,
            body: BytesMut::from(&frame.body[..]),
            fragments: 1,
        };
        let replaced = match key {
            Some(id) => self.by_request_id.insert(id, partial).is_some(),
            None => self.current.replace(partial).is_some(),
        };
        if replaced {
            warn!(
                "Discarding incomplete fragmented message (request_id={:?})",
                key
            );
        }
        Ok(None)
    }
}

impl Default for FragmentAssembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE)
    }
}
