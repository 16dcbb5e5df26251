//! Streaming reader/writer and CDR encapsulations
//!
//! An encapsulation is an octet sequence whose first octet announces the
//! byte order of the content that follows. Alignment inside the
//! encapsulation restarts at its first octet (the byte-order flag sits at
//! position 0).

use crate::error::CdrError;
use crate::{CdrContext, CdrDecode, CdrEncode, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Writes a CDR stream while tracking the alignment position.
#[derive(Debug)]
pub struct CdrWriter {
    buf: BytesMut,
    ctx: CdrContext,
    position: usize,
}

impl CdrWriter {
    /// Writer whose first byte sits at alignment position 0
    pub fn new(ctx: CdrContext) -> Self {
        Self::with_position(ctx, 0)
    }

    /// Writer whose first byte sits at `position`, e.g. 12 for a GIOP body
    pub fn with_position(ctx: CdrContext, position: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            ctx,
            position,
        }
    }

    /// Writer for encapsulation content; the byte-order octet is already written.
    pub fn encapsulation(ctx: CdrContext) -> Self {
        let mut writer = Self::new(ctx);
        writer.buf.put_u8(ctx.byte_order_flag());
        writer.position = 1;
        writer
    }

    pub fn context(&self) -> &CdrContext {
        &self.ctx
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a value
    pub fn write<T: CdrEncode + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.cdr_encode(&mut self.buf, &self.ctx, &mut self.position)
    }

    /// Append raw octets with no length prefix
    pub fn write_octets(&mut self, octets: &[u8]) {
        self.buf.put_slice(octets);
        self.position += octets.len();
    }

    /// Pad with zero octets up to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        self.ctx.write_align(&mut self.buf, &mut self.position, alignment);
    }

    /// Append an encapsulation built by `f` as a `sequence<octet>`.
    ///
    /// The nested content uses `ctx` for its byte order and restarts
    /// alignment at its own first octet.
    pub fn write_encapsulation<F>(&mut self, ctx: CdrContext, f: F) -> Result<()>
    where
        F: FnOnce(&mut CdrWriter) -> Result<()>,
    {
        let data = Encapsulation::encode(ctx, f)?;
        self.write(&data)
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Reads a CDR stream while tracking the alignment position.
///
/// Reads never copy: octet sequences are returned as slices of the
/// underlying [`Bytes`].
#[derive(Debug, Clone)]
pub struct CdrReader {
    data: Bytes,
    ctx: CdrContext,
    base: usize,
    position: usize,
}

impl CdrReader {
    /// Reader whose first byte sits at alignment position 0
    pub fn new(data: Bytes, ctx: CdrContext) -> Self {
        Self::with_position(data, ctx, 0)
    }

    /// Reader whose first byte sits at `position`, e.g. 12 for a GIOP body
    pub fn with_position(data: Bytes, ctx: CdrContext, position: usize) -> Self {
        Self {
            data,
            ctx,
            base: position,
            position,
        }
    }

    /// Reader over encapsulation data, byte-order octet included.
    pub fn encapsulation(data: Bytes) -> Result<Self> {
        let flag = *data
            .first()
            .ok_or(CdrError::MalformedEncoding { needed: 1, have: 0 })?;
        if flag > 1 {
            return Err(CdrError::InvalidEnumValue(flag as u32));
        }
        Ok(Self {
            data,
            ctx: CdrContext::from_flags(flag),
            base: 0,
            position: 1,
        })
    }

    pub fn context(&self) -> &CdrContext {
        &self.ctx
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index()
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn index(&self) -> usize {
        self.position - self.base
    }

    /// Decode the next value
    pub fn read<T: CdrDecode>(&mut self) -> Result<T> {
        let mut buf = &self.data[self.index()..];
        T::cdr_decode(&mut buf, &self.ctx, &mut self.position)
    }

    /// Take `len` raw octets with no length prefix
    pub fn read_octets(&mut self, len: usize) -> Result<Bytes> {
        if self.remaining() < len {
            return Err(CdrError::MalformedEncoding {
                needed: len,
                have: self.remaining(),
            });
        }
        let start = self.index();
        self.position += len;
        Ok(self.data.slice(start..start + len))
    }

    /// Skip padding up to the next multiple of `alignment`.
    ///
    /// Tolerates a stream that ends before the padding does; GIOP 1.2 bodies
    /// may legitimately stop right after the header fields.
    pub fn align(&mut self, alignment: usize) {
        let padding = CdrContext::align_padding(self.position, alignment).min(self.remaining());
        self.position += padding;
    }

    /// Everything not yet read
    pub fn rest(&mut self) -> Bytes {
        let start = self.index();
        self.position = self.base + self.data.len();
        self.data.slice(start..)
    }

    /// Read a `sequence<octet>` holding an encapsulation and open it.
    ///
    /// The nested reader keeps this reader's code sets.
    pub fn read_encapsulation(&mut self) -> Result<CdrReader> {
        let data: Bytes = self.read()?;
        let mut nested = CdrReader::encapsulation(data)?;
        nested.ctx = nested
            .ctx
            .with_code_sets(self.ctx.char_set, self.ctx.wchar_set);
        Ok(nested)
    }
}

/// Encapsulation helpers
pub struct Encapsulation;

impl Encapsulation {
    /// Build encapsulation data: byte-order octet followed by what `f` writes.
    ///
    /// The result does not include the outer `sequence<octet>` length.
    pub fn encode<F>(ctx: CdrContext, f: F) -> Result<Bytes>
    where
        F: FnOnce(&mut CdrWriter) -> Result<()>,
    {
        let mut writer = CdrWriter::encapsulation(ctx);
        f(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// Open encapsulation data (byte-order octet first) and hand the
    /// positioned reader to `f`.
    pub fn decode<T, F>(data: Bytes, f: F) -> Result<T>
    where
        F: FnOnce(&mut CdrReader) -> Result<T>,
    {
        let mut reader = CdrReader::encapsulation(data)?;
        f(&mut reader)
    }
}
