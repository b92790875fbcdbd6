//! N9M frame and header profile
//!
//! ```text
//! byte 0      : bits7-6 version, bit5 padding, bit4 marker, bits3-0 csrc count
//! byte 1      : payload type
//! bytes 2..N  : channel id (2 or 4 bytes, per profile)
//! next 4 bytes: payload length, big-endian
//! [0/2/4]     : reserved (per profile)
//! payload     : exactly `payload length` bytes
//! ```

use bytes::Bytes;

use super::constants::*;
use super::signal::Signal;
use crate::error::ProtocolError;

/// Payload type carried in header byte 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    /// JSON signal envelope
    Signal,
    /// JSON metadata
    Metadata,
    /// Binary media (H.264 elementary stream)
    Media,
    /// Any other value, carried through and ignored
    Reserved(u8),
}

impl PayloadType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            PAYLOAD_TYPE_SIGNAL => PayloadType::Signal,
            PAYLOAD_TYPE_METADATA => PayloadType::Metadata,
            PAYLOAD_TYPE_MEDIA => PayloadType::Media,
            other => PayloadType::Reserved(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            PayloadType::Signal => PAYLOAD_TYPE_SIGNAL,
            PayloadType::Metadata => PAYLOAD_TYPE_METADATA,
            PayloadType::Media => PAYLOAD_TYPE_MEDIA,
            PayloadType::Reserved(b) => b,
        }
    }

    /// Whether the payload is JSON
    pub fn is_json(self) -> bool {
        matches!(self, PayloadType::Signal | PayloadType::Metadata)
    }
}

/// Width of the channel (ssrc) field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelWidth {
    /// 16-bit channel id
    Narrow,
    /// 32-bit channel id
    Wide,
}

impl ChannelWidth {
    pub fn size(self) -> usize {
        match self {
            ChannelWidth::Narrow => 2,
            ChannelWidth::Wide => 4,
        }
    }
}

/// Width of the reserved field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedWidth {
    /// No reserved field
    Absent,
    /// 2-byte reserved field
    Short,
    /// 4-byte reserved field
    Long,
}

impl ReservedWidth {
    /// Closest supported width for a byte count
    pub fn from_len(len: usize) -> Self {
        match len {
            0 => ReservedWidth::Absent,
            1 | 2 => ReservedWidth::Short,
            _ => ReservedWidth::Long,
        }
    }

    pub fn size(self) -> usize {
        match self {
            ReservedWidth::Absent => 0,
            ReservedWidth::Short => 2,
            ReservedWidth::Long => 4,
        }
    }
}

/// Deployment-specific header layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderProfile {
    /// Width of the channel id field
    pub channel_width: ChannelWidth,

    /// Width of the reserved field
    pub reserved_width: ReservedWidth,

    /// Reject frames whose version differs (None = accept any)
    pub version: Option<u8>,

    /// Largest payload the codec will accept
    pub max_payload_size: u32,
}

impl Default for HeaderProfile {
    fn default() -> Self {
        Self {
            channel_width: ChannelWidth::Narrow,
            reserved_width: ReservedWidth::from_len(DEFAULT_RESERVED_LEN),
            version: Some(N9M_VERSION),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl HeaderProfile {
    /// Fixed header size for this profile
    pub fn header_size(&self) -> usize {
        HEADER_PREFIX_SIZE
            + self.channel_width.size()
            + PAYLOAD_LENGTH_SIZE
            + self.reserved_width.size()
    }

    /// Use a 32-bit channel id
    pub fn wide_channel(mut self) -> Self {
        self.channel_width = ChannelWidth::Wide;
        self
    }

    /// Set the reserved field width (clamped to 0, 2 or 4)
    pub fn reserved_len(mut self, len: usize) -> Self {
        self.reserved_width = ReservedWidth::from_len(len);
        self
    }

    /// Set the maximum payload size
    pub fn max_payload_size(mut self, max: u32) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Accept any header version
    pub fn any_version(mut self) -> Self {
        self.version = None;
        self
    }
}

/// One protocol unit: header fields plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 2-bit version
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Marker flag
    pub marker: bool,
    /// 4-bit CSRC count
    pub csrc_count: u8,
    /// Payload type
    pub payload_type: PayloadType,
    /// Channel (ssrc) id
    pub channel: u32,
    /// Reserved field value (only the profile's width is written)
    pub reserved: u32,
    /// Payload bytes (zero-copy via reference counting)
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with default header flags
    pub fn new(payload_type: PayloadType, channel: u32, payload: Bytes) -> Self {
        Self {
            version: N9M_VERSION,
            padding: false,
            marker: false,
            csrc_count: 0,
            payload_type,
            channel,
            reserved: 0,
            payload,
        }
    }

    /// Create a media frame
    pub fn media(channel: u32, payload: Bytes) -> Self {
        Self::new(PayloadType::Media, channel, payload)
    }

    /// Create a signal frame from a signal envelope
    pub fn signal(channel: u32, signal: &Signal) -> Self {
        Self::new(PayloadType::Signal, channel, signal.to_bytes())
    }

    /// Declared payload length
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Parse the payload as a signal envelope
    pub fn parse_signal(&self) -> Result<Signal, ProtocolError> {
        Signal::from_slice(&self.payload)
    }
}
