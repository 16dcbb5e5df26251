//! GIOP transport layer
//!
//! GIOP runs over a reliable byte stream. Messages are self-delimiting via
//! the `message_size` field of the 12-byte header.
//!
//! Reading runs a small state machine:
//!
//! ```text
//! AwaitingHeader --(12 bytes, magic/version/type valid)--> AwaitingBody
//! AwaitingBody   --(message_size bytes)-----------------> Dispatch
//! Dispatch       --(fragment assembler)-----------------> complete message
//!                                                          or AwaitingHeader
//! ```
//!
//! The reader never pulls more bytes from the stream than the current state
//! needs, so a rejected header leaves its body unread. State survives
//! cancellation of [`GiopTransport::read_message`].

use crate::error::{GiopError, Result};
use crate::fragmentation::{FragmentAssembler, FragmentGenerator};
use crate::giop::{GiopFrame, GiopHeader, Message};
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Maximum message size (16 MB default)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
enum ReadState {
    AwaitingHeader,
    AwaitingBody(GiopHeader),
}

/// GIOP transport for reading/writing messages over a byte stream
pub struct GiopTransport<T> {
    inner: T,
    max_message_size: usize,
    read_buf: BytesMut,
    state: ReadState,
    assembler: FragmentAssembler,
}

impl<T> GiopTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buf: BytesMut::with_capacity(8192),
            state: ReadState::AwaitingHeader,
            assembler: FragmentAssembler::new(DEFAULT_MAX_MESSAGE_SIZE),
        }
    }

    pub fn with_max_message_size(mut self, max_size: usize) -> Self {
        self.max_message_size = max_size;
        self.assembler = FragmentAssembler::new(max_size);
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: AsyncRead + Unpin> GiopTransport<T> {
    /// Read one physical frame (a fragment is returned as is)
    pub async fn read_frame(&mut self) -> Result<GiopFrame> {
        loop {
            match self.state {
                ReadState::AwaitingHeader => {
                    self.fill_to(GiopHeader::SIZE, true).await?;
                    let header = GiopHeader::decode(&self.read_buf)?;
                    let size = header.message_size as usize;
                    if size > self.max_message_size {
                        return Err(GiopError::MessageTooLarge {
                            size,
                            max: self.max_message_size,
                        });
                    }
                    self.state = ReadState::AwaitingBody(header);
                }
                ReadState::AwaitingBody(header) => {
                    let total = GiopHeader::SIZE + header.message_size as usize;
                    self.fill_to(total, false).await?;
                    let mut data = self.read_buf.split_to(total);
                    let body = data.split_off(GiopHeader::SIZE).freeze();
                    self.state = ReadState::AwaitingHeader;
                    trace!(
                        "Read {:?}: size={}, more_fragments={}",
                        header.message_type,
                        header.message_size,
                        header.flags.has_more_fragments()
                    );
                    return Ok(GiopFrame { header, body });
                }
            }
        }
    }

    /// Read the next complete logical message, reassembling fragments
    pub async fn read_message(&mut self) -> Result<GiopFrame> {
        loop {
            let frame = self.read_frame().await?;
            if let Some(complete) = self.assembler.push(frame)? {
                return Ok(complete);
            }
        }
    }

    /// Read and decode the next complete message
    pub async fn read_decoded(&mut self) -> Result<(GiopHeader, Message)> {
        let frame = self.read_message().await?;
        let message = Message::decode(&frame)?;
        Ok((frame.header, message))
    }

    /// Read until `read_buf` holds `target` bytes, never beyond.
    async fn fill_to(&mut self, target: usize, at_boundary: bool) -> Result<()> {
        while self.read_buf.len() < target {
            let wanted = (target - self.read_buf.len()) as u64;
            let n = (&mut self.inner)
                .take(wanted)
                .read_buf(&mut self.read_buf)
                .await?;
            if n == 0 {
                if at_boundary && self.read_buf.is_empty() {
                    return Err(GiopError::ConnectionClosed);
                }
                return Err(GiopError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!(
                        "incomplete message: expected {} bytes, got {}",
                        target,
                        self.read_buf.len()
                    ),
                )));
            }
        }
        Ok(())
    }
}

impl<T: AsyncWrite + Unpin> GiopTransport<T> {
    /// Write already encoded bytes
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Write one frame as is
    pub async fn write_frame(&mut self, frame: &GiopFrame) -> Result<()> {
        self.write_bytes(&frame.encode()).await
    }

    /// Write a frame, fragmenting it when it exceeds `max_fragment_size`.
    ///
    /// GIOP 1.0 has no fragments; its frames always go out whole.
    pub async fn write_message(&mut self, frame: &GiopFrame, max_fragment_size: usize) -> Result<()> {
        if !frame.header.version.supports_fragments() {
            return self.write_frame(frame).await;
        }
        let frames = FragmentGenerator::fragment(frame, max_fragment_size)?;
        if frames.len() == 1 {
            return self.write_frame(frame).await;
        }
        trace!("Sending {} fragments for {:?}", frames.len(), frame.header.message_type);
        let mut data = BytesMut::with_capacity(frame.wire_len() + frames.len() * 16);
        for f in &frames {
            data.extend_from_slice(&f.encode());
        }
        self.write_bytes(&data).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
