//! GIOP (General Inter-ORB Protocol) message types
//!
//! GIOP Message Header Format:
//! ```text
//! +--------+--------+--------+--------+
//! |  'G'   |  'I'   |  'O'   |  'P'   |
//! +--------+--------+--------+--------+
//! | major  | minor  | flags  | msgtype|
//! +--------+--------+--------+--------+
//! |           message_size            |
//! +--------+--------+--------+--------+
//! ```
//!
//! `flags` bit 0 selects little-endian byte order for everything after the
//! flags octet; bit 1 announces that more fragments follow. `message_size`
//! counts the body bytes only.
//!
//! Body alignment is measured from the first byte of the header, so body
//! encoders and decoders start at position [`GiopHeader::SIZE`].

use crate::error::{GiopError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use cdr::{cdr_struct, CdrContext, CdrDecode, CdrEncode, CdrError, CdrReader, CdrWriter};
use std::fmt;

/// GIOP magic number
pub const GIOP_MAGIC: [u8; 4] = *b"GIOP";

/// GIOP protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GiopVersion {
    pub major: u8,
    pub minor: u8,
}

impl GiopVersion {
    pub const V1_0: GiopVersion = GiopVersion { major: 1, minor: 0 };
    pub const V1_1: GiopVersion = GiopVersion { major: 1, minor: 1 };
    pub const V1_2: GiopVersion = GiopVersion { major: 1, minor: 2 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Whether this implementation can speak the version
    pub fn is_supported(&self) -> bool {
        self.major == 1 && self.minor <= 2
    }

    /// Fragmentation exists from GIOP 1.1 on
    pub fn supports_fragments(&self) -> bool {
        self.minor >= 1
    }

    /// GIOP 1.2 reorganised Request/Reply headers and aligns bodies to 8
    pub fn is_1_2(&self) -> bool {
        self.minor >= 2
    }
}

impl Default for GiopVersion {
    fn default() -> Self {
        Self::V1_2
    }
}

impl fmt::Display for GiopVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// GIOP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Reply = 1,
    CancelRequest = 2,
    LocateRequest = 3,
    LocateReply = 4,
    CloseConnection = 5,
    MessageError = 6,
    Fragment = 7,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            1 => Some(Self::Reply),
            2 => Some(Self::CancelRequest),
            3 => Some(Self::LocateRequest),
            4 => Some(Self::LocateReply),
            5 => Some(Self::CloseConnection),
            6 => Some(Self::MessageError),
            7 => Some(Self::Fragment),
            _ => None,
        }
    }

    /// Message types that may carry the more-fragments flag
    pub fn may_fragment(&self) -> bool {
        matches!(
            self,
            Self::Request | Self::Reply | Self::LocateRequest | Self::LocateReply | Self::Fragment
        )
    }
}

/// GIOP header flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GiopFlags(u8);

impl GiopFlags {
    /// Little-endian byte order
    pub const LITTLE_ENDIAN: u8 = 0x01;
    /// More fragments follow
    pub const MORE_FRAGMENTS: u8 = 0x02;

    pub fn new(little_endian: bool) -> Self {
        if little_endian {
            Self(Self::LITTLE_ENDIAN)
        } else {
            Self(0)
        }
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_little_endian(&self) -> bool {
        self.0 & Self::LITTLE_ENDIAN != 0
    }

    pub fn has_more_fragments(&self) -> bool {
        self.0 & Self::MORE_FRAGMENTS != 0
    }

    pub fn set_more_fragments(&mut self, more: bool) -> &mut Self {
        if more {
            self.0 |= Self::MORE_FRAGMENTS;
        } else {
            self.0 &= !Self::MORE_FRAGMENTS;
        }
        self
    }
}

/// GIOP message header (12 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GiopHeader {
    pub version: GiopVersion,
    pub flags: GiopFlags,
    pub message_type: MessageType,
    pub message_size: u32,
}

impl GiopHeader {
    pub const SIZE: usize = 12;

    pub fn new(version: GiopVersion, ctx: CdrContext, message_type: MessageType) -> Self {
        Self {
            version,
            flags: GiopFlags::new(ctx.little_endian),
            message_type,
            message_size: 0,
        }
    }

    /// Byte order of everything after the flags octet
    pub fn context(&self) -> CdrContext {
        CdrContext::with_byte_order(self.flags.is_little_endian())
    }

    /// Decode and validate a header.
    ///
    /// Only the first [`Self::SIZE`] bytes of `data` are examined. The magic
    /// is checked before anything else.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(CdrError::MalformedEncoding {
                needed: Self::SIZE,
                have: data.len(),
            }
            .into());
        }

        let magic = [data[0], data[1], data[2], data[3]];
        if magic != GIOP_MAGIC {
            return Err(GiopError::BadMagic { magic });
        }

        let version = GiopVersion::new(data[4], data[5]);
        if !version.is_supported() {
            return Err(GiopError::UnsupportedVersion {
                major: version.major,
                minor: version.minor,
            });
        }

        let flags = GiopFlags(data[6]);
        let message_type =
            MessageType::from_u8(data[7]).ok_or(GiopError::InvalidMessageType(data[7]))?;

        if !version.supports_fragments()
            && (flags.has_more_fragments() || message_type == MessageType::Fragment)
        {
            return Err(GiopError::FragmentationUnsupported {
                major: version.major,
                minor: version.minor,
            });
        }
        if flags.has_more_fragments() && !message_type.may_fragment() {
            return Err(GiopError::FragmentNotAllowed(message_type));
        }

        let ctx = CdrContext::from_flags(flags.bits());
        let mut size_bytes = &data[8..12];
        let message_size = ctx.get_u32(&mut size_bytes);

        Ok(Self {
            version,
            flags,
            message_type,
            message_size,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&GIOP_MAGIC);
        buf.put_u8(self.version.major);
        buf.put_u8(self.version.minor);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.message_type as u8);
        self.context().put_u32(buf, self.message_size);
    }
}

/// One physical GIOP message: header plus exactly `message_size` body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiopFrame {
    pub header: GiopHeader,
    pub body: Bytes,
}

impl GiopFrame {
    pub fn new(mut header: GiopHeader, body: Bytes) -> Result<Self> {
        header.message_size = u32::try_from(body.len()).map_err(|_| GiopError::MessageTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        })?;
        Ok(Self { header, body })
    }

    /// Total length on the wire
    pub fn wire_len(&self) -> usize {
        GiopHeader::SIZE + self.body.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// Decode a frame whose length must match its header exactly
    pub fn decode(data: Bytes) -> Result<Self> {
        let header = GiopHeader::decode(&data)?;
        let expected = GiopHeader::SIZE + header.message_size as usize;
        if data.len() != expected {
            return Err(CdrError::MalformedEncoding {
                needed: expected,
                have: data.len(),
            }
            .into());
        }
        Ok(Self {
            header,
            body: data.slice(GiopHeader::SIZE..),
        })
    }

    /// Request id opening a GIOP 1.2 Request, Reply, LocateRequest,
    /// LocateReply or Fragment body
    pub fn leading_request_id(&self) -> Result<u32> {
        let (id, _) = cdr::decode_at::<u32>(&self.body, 0, &self.header.context())?;
        Ok(id)
    }
}

cdr_struct! {
    /// Service context entry carried in Request and Reply headers
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ServiceContext {
        pub context_id: u32,
        pub context_data: Bytes,
    }
}

impl ServiceContext {
    pub fn new(context_id: u32, context_data: Bytes) -> Self {
        Self {
            context_id,
            context_data,
        }
    }

    /// First entry with the given id
    pub fn find(list: &[ServiceContext], context_id: u32) -> Option<&ServiceContext> {
        list.iter().find(|sc| sc.context_id == context_id)
    }
}

/// GIOP 1.2 target address discriminators
pub mod addressing {
    pub const KEY_ADDR: u16 = 0;
    pub const PROFILE_ADDR: u16 = 1;
    pub const REFERENCE_ADDR: u16 = 2;
}

cdr_struct! {
    /// Profile inside a `ReferenceAddr` target, kept undecoded
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct AddressedProfile {
        pub tag: u32,
        pub profile_data: Bytes,
    }
}

/// Object addressed by a Request or LocateRequest
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetAddress {
    ObjectKey(Bytes),
    Profile { tag: u32, profile_data: Bytes },
    /// A whole IOR plus the index of the profile the client picked
    Reference {
        selected_profile_index: u32,
        type_id: String,
        profiles: Vec<AddressedProfile>,
    },
}

impl TargetAddress {
    pub fn discriminator(&self) -> u16 {
        match self {
            Self::ObjectKey(_) => addressing::KEY_ADDR,
            Self::Profile { .. } => addressing::PROFILE_ADDR,
            Self::Reference { .. } => addressing::REFERENCE_ADDR,
        }
    }

    pub fn object_key(&self) -> Option<&Bytes> {
        match self {
            Self::ObjectKey(key) => Some(key),
            Self::Profile { .. } | Self::Reference { .. } => None,
        }
    }

    fn encode(&self, w: &mut CdrWriter) -> Result<()> {
        w.write(&self.discriminator())?;
        match self {
            Self::ObjectKey(key) => w.write(key)?,
            Self::Profile { tag, profile_data } => {
                w.write(tag)?;
                w.write(profile_data)?;
            }
            Self::Reference {
                selected_profile_index,
                type_id,
                profiles,
            } => {
                w.write(selected_profile_index)?;
                w.write(type_id.as_str())?;
                w.write(profiles)?;
            }
        }
        Ok(())
    }

    fn decode(r: &mut CdrReader) -> Result<Self> {
        match r.read::<u16>()? {
            addressing::KEY_ADDR => Ok(Self::ObjectKey(r.read()?)),
            addressing::PROFILE_ADDR => Ok(Self::Profile {
                tag: r.read()?,
                profile_data: r.read()?,
            }),
            addressing::REFERENCE_ADDR => Ok(Self::Reference {
                selected_profile_index: r.read()?,
                type_id: r.read()?,
                profiles: r.read()?,
            }),
            other => Err(GiopError::UnsupportedTargetAddress(other)),
        }
    }

    /// GIOP 1.0 and 1.1 can only carry an object key
    fn require_key(&self) -> Result<&Bytes> {
        self.object_key()
            .ok_or(GiopError::UnsupportedTargetAddress(self.discriminator()))
    }
}

/// Reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReplyStatus {
    NoException = 0,
    UserException = 1,
    SystemException = 2,
    LocationForward = 3,
    LocationForwardPerm = 4,
    NeedsAddressingMode = 5,
}

impl ReplyStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::NoException),
            1 => Some(Self::UserException),
            2 => Some(Self::SystemException),
            3 => Some(Self::LocationForward),
            4 => Some(Self::LocationForwardPerm),
            5 => Some(Self::NeedsAddressingMode),
            _ => None,
        }
    }
}

/// LocateReply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LocateStatus {
    UnknownObject = 0,
    ObjectHere = 1,
    ObjectForward = 2,
    ObjectForwardPerm = 3,
    LocSystemException = 4,
    LocNeedsAddressingMode = 5,
}

impl LocateStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::UnknownObject),
            1 => Some(Self::ObjectHere),
            2 => Some(Self::ObjectForward),
            3 => Some(Self::ObjectForwardPerm),
            4 => Some(Self::LocSystemException),
            5 => Some(Self::LocNeedsAddressingMode),
            _ => None,
        }
    }
}

/// Completion status of a system exception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CompletionStatus {
    Yes = 0,
    No = 1,
    Maybe = 2,
}

impl CompletionStatus {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Yes),
            1 => Some(Self::No),
            2 => Some(Self::Maybe),
            _ => None,
        }
    }
}

/// Repository ids of the standard system exceptions raised by this crate
pub mod system_exception_id {
    pub const UNKNOWN: &str = "IDL:omg.org/CORBA/UNKNOWN:1.0";
    pub const BAD_PARAM: &str = "IDL:omg.org/CORBA/BAD_PARAM:1.0";
    pub const MARSHAL: &str = "IDL:omg.org/CORBA/MARSHAL:1.0";
    pub const COMM_FAILURE: &str = "IDL:omg.org/CORBA/COMM_FAILURE:1.0";
    pub const OBJECT_NOT_EXIST: &str = "IDL:omg.org/CORBA/OBJECT_NOT_EXIST:1.0";
    pub const BAD_OPERATION: &str = "IDL:omg.org/CORBA/BAD_OPERATION:1.0";
    pub const NO_IMPLEMENT: &str = "IDL:omg.org/CORBA/NO_IMPLEMENT:1.0";
    pub const TRANSIENT: &str = "IDL:omg.org/CORBA/TRANSIENT:1.0";
    pub const CODESET_INCOMPATIBLE: &str = "IDL:omg.org/CORBA/CODESET_INCOMPATIBLE:1.0";
}

/// Body of a SYSTEM_EXCEPTION reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemException {
    pub repository_id: String,
    pub minor: u32,
    pub completed: CompletionStatus,
}

impl SystemException {
    pub fn new(repository_id: impl Into<String>, minor: u32, completed: CompletionStatus) -> Self {
        Self {
            repository_id: repository_id.into(),
            minor,
            completed,
        }
    }

    pub fn unknown() -> Self {
        Self::new(system_exception_id::UNKNOWN, 0, CompletionStatus::Maybe)
    }

    pub fn object_not_exist() -> Self {
        Self::new(system_exception_id::OBJECT_NOT_EXIST, 0, CompletionStatus::No)
    }

    pub fn bad_operation() -> Self {
        Self::new(system_exception_id::BAD_OPERATION, 0, CompletionStatus::No)
    }

    pub fn marshal() -> Self {
        Self::new(system_exception_id::MARSHAL, 0, CompletionStatus::No)
    }

    pub fn codeset_incompatible() -> Self {
        Self::new(system_exception_id::CODESET_INCOMPATIBLE, 0, CompletionStatus::No)
    }
}

impl fmt::Display for SystemException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (minor {}, completed {:?})",
            self.repository_id, self.minor, self.completed
        )
    }
}

impl CdrEncode for SystemException {
    fn cdr_encode<B: bytes::BufMut>(
        &self,
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> cdr::Result<()> {
        self.repository_id.cdr_encode(buf, ctx, position)?;
        self.minor.cdr_encode(buf, ctx, position)?;
        (self.completed as u32).cdr_encode(buf, ctx, position)
    }
}

impl CdrDecode for SystemException {
    fn cdr_decode<B: bytes::Buf>(
        buf: &mut B,
        ctx: &CdrContext,
        position: &mut usize,
    ) -> cdr::Result<Self> {
        let repository_id = String::cdr_decode(buf, ctx, position)?;
        let minor = u32::cdr_decode(buf, ctx, position)?;
        let raw = u32::cdr_decode(buf, ctx, position)?;
        let completed = CompletionStatus::from_u32(raw).ok_or(CdrError::InvalidEnumValue(raw))?;
        Ok(Self {
            repository_id,
            minor,
            completed,
        })
    }
}

/// Where a decoded body sits in its message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPosition {
    pub context: CdrContext,
    pub offset: usize,
}

impl Default for BodyPosition {
    fn default() -> Self {
        Self {
            context: CdrContext::default(),
            offset: GiopHeader::SIZE,
        }
    }
}

impl BodyPosition {
    fn of(r: &CdrReader) -> Self {
        Self {
            context: *r.context(),
            offset: r.position(),
        }
    }
}

/// Request message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMessage {
    pub request_id: u32,
    pub response_expected: bool,
    pub target: TargetAddress,
    pub operation: String,
    pub service_contexts: Vec<ServiceContext>,
    /// GIOP 1.0/1.1 only
    pub requesting_principal: Bytes,
    /// Marshaled arguments
    pub body: Bytes,
    /// Filled in by decoding
    pub body_position: BodyPosition,
}

impl RequestMessage {
    pub fn new(object_key: Bytes, operation: impl Into<String>, body: Bytes) -> Self {
        Self {
            request_id: 0,
            response_expected: true,
            target: TargetAddress::ObjectKey(object_key),
            operation: operation.into(),
            service_contexts: Vec::new(),
            requesting_principal: Bytes::new(),
            body,
            body_position: BodyPosition::default(),
        }
    }

    pub fn oneway(mut self) -> Self {
        self.response_expected = false;
        self
    }

    /// Reader over the body, positioned for correct alignment
    pub fn body_reader(&self) -> CdrReader {
        CdrReader::with_position(
            self.body.clone(),
            self.body_position.context,
            self.body_position.offset,
        )
    }

    /// Message offset at which a non-empty body will start, for marshaling
    /// the body with the right alignment before it is attached.
    pub fn body_offset(&self, version: GiopVersion, ctx: CdrContext) -> Result<usize> {
        let mut w = CdrWriter::with_position(ctx, GiopHeader::SIZE);
        let header_only = Self {
            body: Bytes::new(),
            ..self.clone()
        };
        header_only.encode_body(&mut w, version)?;
        let end = w.position();
        if version.is_1_2() {
            Ok(end + CdrContext::align_padding(end, 8))
        } else {
            Ok(end)
        }
    }

    fn encode_body(&self, w: &mut CdrWriter, version: GiopVersion) -> Result<()> {
        if version.is_1_2() {
            w.write(&self.request_id)?;
            // SYNC_WITH_TARGET when a reply is wanted
            let response_flags: u8 = if self.response_expected { 0x03 } else { 0x00 };
            w.write(&response_flags)?;
            w.write(&[0u8; 3])?;
            self.target.encode(w)?;
            w.write(self.operation.as_str())?;
            w.write(&self.service_contexts)?;
            if !self.body.is_empty() {
                w.align(8);
            }
        } else {
            w.write(&self.service_contexts)?;
            w.write(&self.request_id)?;
            w.write(&self.response_expected)?;
            if version.minor == 1 {
                w.write(&[0u8; 3])?;
            }
            w.write(self.target.require_key()?)?;
            w.write(self.operation.as_str())?;
            w.write(&self.requesting_principal)?;
        }
        w.write_octets(&self.body);
        Ok(())
    }

    fn decode_body(r: &mut CdrReader, version: GiopVersion) -> Result<Self> {
        if version.is_1_2() {
            let request_id = r.read()?;
            let response_flags: u8 = r.read()?;
            let _reserved: [u8; 3] = r.read()?;
            let target = TargetAddress::decode(r)?;
            let operation = r.read()?;
            let service_contexts = r.read()?;
            r.align(8);
            let body_position = BodyPosition::of(r);
            Ok(Self {
                request_id,
                response_expected: response_flags & 0x01 != 0,
                target,
                operation,
                service_contexts,
                requesting_principal: Bytes::new(),
                body: r.rest(),
                body_position,
            })
        } else {
            let service_contexts = r.read()?;
            let request_id = r.read()?;
            let response_expected = r.read()?;
            if version.minor == 1 {
                let _reserved: [u8; 3] = r.read()?;
            }
            let object_key = r.read()?;
            let operation = r.read()?;
            let requesting_principal = r.read()?;
            let body_position = BodyPosition::of(r);
            Ok(Self {
                request_id,
                response_expected,
                target: TargetAddress::ObjectKey(object_key),
                operation,
                service_contexts,
                requesting_principal,
                body: r.rest(),
                body_position,
            })
        }
    }
}

/// Reply message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyMessage {
    pub request_id: u32,
    pub reply_status: ReplyStatus,
    pub service_contexts: Vec<ServiceContext>,
    pub body: Bytes,
    /// Filled in by decoding
    pub body_position: BodyPosition,
}

impl ReplyMessage {
    pub fn new(request_id: u32, reply_status: ReplyStatus, body: Bytes) -> Self {
        Self {
            request_id,
            reply_status,
            service_contexts: Vec::new(),
            body,
            body_position: BodyPosition::default(),
        }
    }

    pub fn body_reader(&self) -> CdrReader {
        CdrReader::with_position(
            self.body.clone(),
            self.body_position.context,
            self.body_position.offset,
        )
    }

    /// Decode the body of a SYSTEM_EXCEPTION reply
    pub fn system_exception(&self) -> Result<SystemException> {
        Ok(self.body_reader().read()?)
    }

    fn encode_body(&self, w: &mut CdrWriter, version: GiopVersion) -> Result<()> {
        if version.is_1_2() {
            w.write(&self.request_id)?;
            w.write(&(self.reply_status as u32))?;
            w.write(&self.service_contexts)?;
            if !self.body.is_empty() {
                w.align(8);
            }
        } else {
            w.write(&self.service_contexts)?;
            w.write(&self.request_id)?;
            w.write(&(self.reply_status as u32))?;
        }
        w.write_octets(&self.body);
        Ok(())
    }

    fn decode_body(r: &mut CdrReader, version: GiopVersion) -> Result<Self> {
        let (request_id, status, service_contexts) = if version.is_1_2() {
            let request_id = r.read()?;
            let status: u32 = r.read()?;
            let service_contexts = r.read()?;
            r.align(8);
            (request_id, status, service_contexts)
        } else {
            let service_contexts = r.read()?;
            let request_id = r.read()?;
            let status: u32 = r.read()?;
            (request_id, status, service_contexts)
        };
        let reply_status =
            ReplyStatus::from_u32(status).ok_or(CdrError::InvalidEnumValue(status))?;
        let body_position = BodyPosition::of(r);
        Ok(Self {
            request_id,
            reply_status,
            service_contexts,
            body: r.rest(),
            body_position,
        })
    }
}

/// CancelRequest message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelRequestMessage {
    pub request_id: u32,
}

/// LocateRequest message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateRequestMessage {
    pub request_id: u32,
    pub target: TargetAddress,
}

impl LocateRequestMessage {
    pub fn new(object_key: Bytes) -> Self {
        Self {
            request_id: 0,
            target: TargetAddress::ObjectKey(object_key),
        }
    }

    fn encode_body(&self, w: &mut CdrWriter, version: GiopVersion) -> Result<()> {
        w.write(&self.request_id)?;
        if version.is_1_2() {
            self.target.encode(w)
        } else {
            w.write(self.target.require_key()?)?;
            Ok(())
        }
    }

    fn decode_body(r: &mut CdrReader, version: GiopVersion) -> Result<Self> {
        let request_id = r.read()?;
        let target = if version.is_1_2() {
            TargetAddress::decode(r)?
        } else {
            TargetAddress::ObjectKey(r.read()?)
        };
        Ok(Self { request_id, target })
    }
}

/// LocateReply message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateReplyMessage {
    pub request_id: u32,
    pub locate_status: LocateStatus,
    pub body: Bytes,
    /// Filled in by decoding
    pub body_position: BodyPosition,
}

impl LocateReplyMessage {
    pub fn new(request_id: u32, locate_status: LocateStatus) -> Self {
        Self {
            request_id,
            locate_status,
            body: Bytes::new(),
            body_position: BodyPosition::default(),
        }
    }

    pub fn body_reader(&self) -> CdrReader {
        CdrReader::with_position(
            self.body.clone(),
            self.body_position.context,
            self.body_position.offset,
        )
    }

    fn encode_body(&self, w: &mut CdrWriter, version: GiopVersion) -> Result<()> {
        w.write(&self.request_id)?;
        w.write(&(self.locate_status as u32))?;
        if version.is_1_2() && !self.body.is_empty() {
            w.align(8);
        }
        w.write_octets(&self.body);
        Ok(())
    }

    fn decode_body(r: &mut CdrReader, version: GiopVersion) -> Result<Self> {
        let request_id = r.read()?;
        let status: u32 = r.read()?;
        let locate_status = LocateStatus::from_u32(status)
            .ok_or(CdrError::InvalidEnumValue(status))?;
        if version.is_1_2() {
            r.align(8);
        }
        let body_position = BodyPosition::of(r);
        Ok(Self {
            request_id,
            locate_status,
            body: r.rest(),
            body_position,
        })
    }
}

/// Fragment message (continuation of a fragmented message)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentMessage {
    /// Present in GIOP 1.2 only
    pub request_id: Option<u32>,
    pub body: Bytes,
}

/// Decoded GIOP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(RequestMessage),
    Reply(ReplyMessage),
    CancelRequest(CancelRequestMessage),
    LocateRequest(LocateRequestMessage),
    LocateReply(LocateReplyMessage),
    CloseConnection,
    MessageError,
    Fragment(FragmentMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Request(_) => MessageType::Request,
            Message::Reply(_) => MessageType::Reply,
            Message::CancelRequest(_) => MessageType::CancelRequest,
            Message::LocateRequest(_) => MessageType::LocateRequest,
            Message::LocateReply(_) => MessageType::LocateReply,
            Message::CloseConnection => MessageType::CloseConnection,
            Message::MessageError => MessageType::MessageError,
            Message::Fragment(_) => MessageType::Fragment,
        }
    }

    pub fn request_id(&self) -> Option<u32> {
        match self {
            Message::Request(m) => Some(m.request_id),
            Message::Reply(m) => Some(m.request_id),
            Message::CancelRequest(m) => Some(m.request_id),
            Message::LocateRequest(m) => Some(m.request_id),
            Message::LocateReply(m) => Some(m.request_id),
            Message::Fragment(m) => m.request_id,
            Message::CloseConnection | Message::MessageError => None,
        }
    }

    /// Encode as a single unfragmented frame
    pub fn encode(&self, version: GiopVersion, ctx: CdrContext) -> Result<GiopFrame> {
        let mut w = CdrWriter::with_position(ctx, GiopHeader::SIZE);
        match self {
            Message::Request(m) => m.encode_body(&mut w, version)?,
            Message::Reply(m) => m.encode_body(&mut w, version)?,
            Message::CancelRequest(m) => w.write(&m.request_id)?,
            Message::LocateRequest(m) => m.encode_body(&mut w, version)?,
            Message::LocateReply(m) => m.encode_body(&mut w, version)?,
            Message::CloseConnection | Message::MessageError => {}
            Message::Fragment(m) => {
                if !version.supports_fragments() {
                    return Err(GiopError::FragmentationUnsupported {
                        major: version.major,
                        minor: version.minor,
                    });
                }
                if version.is_1_2() {
                    w.write(&m.request_id.unwrap_or_default())?;
                }
                w.write_octets(&m.body);
            }
        }
        let header = GiopHeader::new(version, ctx, self.message_type());
        GiopFrame::new(header, w.into_bytes())
    }

    /// Decode a complete (reassembled) frame
    pub fn decode(frame: &GiopFrame) -> Result<Message> {
        let version = frame.header.version;
        let mut r =
            CdrReader::with_position(frame.body.clone(), frame.header.context(), GiopHeader::SIZE);
        let message = match frame.header.message_type {
            MessageType::Request => Message::Request(RequestMessage::decode_body(&mut r, version)?),
            MessageType::Reply => Message::Reply(ReplyMessage::decode_body(&mut r, version)?),
            MessageType::CancelRequest => Message::CancelRequest(CancelRequestMessage {
                request_id: r.read()?,
            }),
            MessageType::LocateRequest => {
                Message::LocateRequest(LocateRequestMessage::decode_body(&mut r, version)?)
            }
            MessageType::LocateReply => {
                Message::LocateReply(LocateReplyMessage::decode_body(&mut r, version)?)
            }
            MessageType::CloseConnection => Message::CloseConnection,
            MessageType::MessageError => Message::MessageError,
            MessageType::Fragment => {
                let request_id = if version.is_1_2() {
                    Some(r.read()?)
                } else {
                    None
                };
                Message::Fragment(FragmentMessage {
                    request_id,
                    body: r.rest(),
                })
            }
        };
        Ok(message)
    }
}
