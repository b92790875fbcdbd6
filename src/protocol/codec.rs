//! Frame codec
//!
//! `FrameCodec` is stateless: it decodes at most one frame from the front of
//! a buffer and reports how many bytes it used. `FrameBuffer` carries the
//! partial remainder between socket reads and drives the codec in a loop.
//!
//! The declared payload length is validated as soon as the fixed header is
//! visible, so an oversized claim is rejected before any payload is buffered
//! or allocated.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::frame::{ChannelWidth, Frame, HeaderProfile, PayloadType, ReservedWidth};
use crate::error::FramingError;

/// Decoded fixed header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    version: u8,
    padding: bool,
    marker: bool,
    csrc_count: u8,
    payload_type: PayloadType,
    channel: u32,
    payload_len: u32,
    reserved: u32,
}

/// Stateless encoder/decoder for one header profile
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    profile: HeaderProfile,
}

impl FrameCodec {
    pub fn new(profile: HeaderProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &HeaderProfile {
        &self.profile
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns `(None, 0)` when more bytes are needed, otherwise the frame and
    /// the number of bytes it occupied.
    pub fn decode(&self, buf: &[u8]) -> Result<(Option<Frame>, usize), FramingError> {
        let header = match self.parse_header(buf)? {
            Some(header) => header,
            None => return Ok((None, 0)),
        };

        let header_size = self.profile.header_size();
        let total = header_size + header.payload_len as usize;
        if buf.len() < total {
            return Ok((None, 0));
        }

        let payload = Bytes::copy_from_slice(&buf[header_size..total]);
        Ok((Some(header.into_frame(payload)), total))
    }

    /// Encode a frame into header + payload bytes
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, FramingError> {
        let mut buf = BytesMut::with_capacity(self.profile.header_size() + frame.payload.len());
        self.encode_into(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a frame, appending to `buf`
    pub fn encode_into(&self, frame: &Frame, buf: &mut BytesMut) -> Result<(), FramingError> {
        if frame.version > 0b11 {
            return Err(FramingError::InvalidField("version"));
        }
        if frame.csrc_count > 0x0F {
            return Err(FramingError::InvalidField("csrc_count"));
        }

        let payload_len = u32::try_from(frame.payload.len()).map_err(|_| {
            FramingError::PayloadTooLarge {
                declared: u32::MAX,
                max: self.profile.max_payload_size,
            }
        })?;
        if payload_len > self.profile.max_payload_size {
            return Err(FramingError::PayloadTooLarge {
                declared: payload_len,
                max: self.profile.max_payload_size,
            });
        }

        let mut flags = frame.version << 6 | frame.csrc_count;
        if frame.padding {
            flags |= 0x20;
        }
        if frame.marker {
            flags |= 0x10;
        }

        buf.reserve(self.profile.header_size() + frame.payload.len());
        buf.put_u8(flags);
        buf.put_u8(frame.payload_type.as_byte());

        match self.profile.channel_width {
            ChannelWidth::Narrow => {
                let channel = u16::try_from(frame.channel)
                    .map_err(|_| FramingError::ChannelOutOfRange(frame.channel))?;
                buf.put_u16(channel);
            }
            ChannelWidth::Wide => buf.put_u32(frame.channel),
        }

        buf.put_u32(payload_len);

        match self.profile.reserved_width {
            ReservedWidth::Absent => {}
            ReservedWidth::Short => {
                let reserved = u16::try_from(frame.reserved)
                    .map_err(|_| FramingError::InvalidField("reserved"))?;
                buf.put_u16(reserved);
            }
            ReservedWidth::Long => buf.put_u32(frame.reserved),
        }

        buf.put_slice(&frame.payload);
        Ok(())
    }

    /// Parse and validate the fixed header, if enough bytes are present
    fn parse_header(&self, buf: &[u8]) -> Result<Option<Header>, FramingError> {
        if buf.len() < self.profile.header_size() {
            return Ok(None);
        }

        let mut cursor = buf;
        let flags = cursor.get_u8();
        let payload_type = PayloadType::from_byte(cursor.get_u8());

        let version = flags >> 6;
        if let Some(expected) = self.profile.version {
            if version != expected {
                return Err(FramingError::UnsupportedVersion(version));
            }
        }

        let channel = match self.profile.channel_width {
            ChannelWidth::Narrow => u32::from(cursor.get_u16()),
            ChannelWidth::Wide => cursor.get_u32(),
        };

        let payload_len = cursor.get_u32();
        if payload_len > self.profile.max_payload_size {
            return Err(FramingError::PayloadTooLarge {
                declared: payload_len,
                max: self.profile.max_payload_size,
            });
        }

        let reserved = match self.profile.reserved_width {
            ReservedWidth::Absent => 0,
            ReservedWidth::Short => u32::from(cursor.get_u16()),
            ReservedWidth::Long => cursor.get_u32(),
        };

        Ok(Some(Header {
            version,
            padding: flags & 0x20 != 0,
            marker: flags & 0x10 != 0,
            csrc_count: flags & 0x0F,
            payload_type,
            channel,
            payload_len,
            reserved,
        }))
    }
}

impl Header {
    fn into_frame(self, payload: Bytes) -> Frame {
        Frame {
            version: self.version,
            padding: self.padding,
            marker: self.marker,
            csrc_count: self.csrc_count,
            payload_type: self.payload_type,
            channel: self.channel,
            reserved: self.reserved,
            payload,
        }
    }
}

/// Accumulates socket reads and yields complete frames
///
/// Payloads are split off the internal buffer without copying.
pub struct FrameBuffer {
    codec: FrameCodec,
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a buffer with the default 64KB capacity
    pub fn new(codec: FrameCodec) -> Self {
        Self::with_capacity(codec, 64 * 1024)
    }

    pub fn with_capacity(codec: FrameCodec, capacity: usize) -> Self {
        Self {
            codec,
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Append freshly read bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Mutable access to the backing buffer, for direct socket reads
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Number of buffered bytes not yet consumed
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next complete frame, if any
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FramingError> {
        let header = match self.codec.parse_header(&self.buffer)? {
            Some(header) => header,
            None => return Ok(None),
        };

        let header_size = self.codec.profile.header_size();
        let total = header_size + header.payload_len as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(header_size);
        let payload = self.buffer.split_to(header.payload_len as usize).freeze();
        Ok(Some(header.into_frame(payload)))
    }

    /// Push bytes and drain every complete frame
    pub fn push_and_drain(&mut self, data: &[u8]) -> Result<Vec<Frame>, FramingError> {
        self.push(data);
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::signal::Signal;
    use serde_json::json;

    fn sample_frames() -> Vec<Frame> {
        let connect = Signal::request("CERTIFICATE", "CONNECT", "abc")
            .with_parameter(json!({"DSNO": "00AA", "DEVTYPE": 1, "DEVCLASS": 4}));
        let mut marked = Frame::media(7, Bytes::from_static(&[0, 0, 0, 1, 0x67, 0x42]));
        marked.marker = true;
        marked.reserved = 0xDEAD_BEEF;

        vec![
            Frame::signal(0, &connect),
            Frame::media(5, Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88, 0x84])),
            marked,
            Frame::media(5, Bytes::new()),
            Frame::new(PayloadType::Metadata, 1, Bytes::from_static(b"{\"GPS\":1}")),
        ]
    }

    fn encode_all(codec: &FrameCodec, frames: &[Frame]) -> Vec<u8> {
        let mut out = BytesMut::new();
        for frame in frames {
            codec.encode_into(frame, &mut out).unwrap();
        }
        out.to_vec()
    }

    #[test]
    fn test_partial_header_needs_more() {
        let codec = FrameCodec::default();
        let (frame, consumed) = codec.decode(&[0x80, 0x02, 0x00]).unwrap();
        assert!(frame.is_none());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_partial_payload_needs_more() {
        let codec = FrameCodec::default();
        let bytes = codec
            .encode(&Frame::media(1, Bytes::from_static(&[1, 2, 3, 4])))
            .unwrap();

        let (frame, consumed) = codec.decode(&bytes[..bytes.len() - 1]).unwrap();
        assert!(frame.is_none());
        assert_eq!(consumed, 0);

        let (frame, consumed) = codec.decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.unwrap().payload.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_header_layout() {
        let codec = FrameCodec::default();
        let mut frame = Frame::media(0x0102, Bytes::from_static(&[0xAA]));
        frame.padding = true;
        frame.csrc_count = 3;
        frame.reserved = 0x0A0B_0C0D;

        let bytes = codec.encode(&frame).unwrap();
        assert_eq!(
            bytes.as_ref(),
            &[0xA3, 0x02, 0x01, 0x02, 0x00, 0x00, 0x00, 0x01, 0x0A, 0x0B, 0x0C, 0x0D, 0xAA]
        );
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let codec = FrameCodec::default();
        let frames = sample_frames();
        let mut bytes = encode_all(&codec, &frames);
        bytes.extend_from_slice(&[0x80, 0x02]); // trailing partial header

        let mut offset = 0;
        let mut decoded = Vec::new();
        loop {
            let (frame, consumed) = codec.decode(&bytes[offset..]).unwrap();
            match frame {
                Some(frame) => {
                    decoded.push(frame);
                    offset += consumed;
                }
                None => break,
            }
        }

        assert_eq!(decoded, frames);
        assert_eq!(bytes.len() - offset, 2);
    }

    #[test]
    fn test_chunk_invariance() {
        let codec = FrameCodec::default();
        let frames = sample_frames();
        let bytes = encode_all(&codec, &frames);

        let mut whole = FrameBuffer::new(codec.clone());
        let expected = whole.push_and_drain(&bytes).unwrap();
        assert_eq!(expected, frames);

        for chunk_size in [1, 2, 3, 5, 7, 11, 13, 64, bytes.len()] {
            let mut buffer = FrameBuffer::new(codec.clone());
            let mut decoded = Vec::new();
            for chunk in bytes.chunks(chunk_size) {
                decoded.extend(buffer.push_and_drain(chunk).unwrap());
            }
            assert_eq!(decoded, expected, "chunk size {}", chunk_size);
            assert_eq!(buffer.pending(), 0);
        }
    }

    #[test]
    fn test_chunk_invariance_irregular_splits() {
        let codec = FrameCodec::new(HeaderProfile::default().wide_channel().reserved_len(2));
        // A 2-byte reserved field cannot carry the sample's 32-bit value
        let frames: Vec<Frame> = sample_frames()
            .into_iter()
            .map(|mut frame| {
                frame.reserved &= 0xFFFF;
                frame
            })
            .collect();
        let bytes = encode_all(&codec, &frames);

        // Split points walk through a fixed irregular pattern
        let pattern = [1usize, 9, 4, 17, 2, 30, 6];
        let mut buffer = FrameBuffer::new(codec);
        let mut decoded = Vec::new();
        let mut offset = 0;
        let mut i = 0;
        while offset < bytes.len() {
            let end = (offset + pattern[i % pattern.len()]).min(bytes.len());
            decoded.extend(buffer.push_and_drain(&bytes[offset..end]).unwrap());
            offset = end;
            i += 1;
        }

        assert_eq!(decoded, frames);
    }

    #[test]
    fn test_signal_round_trip() {
        let codec = FrameCodec::default();
        let signal = Signal::request("MEDIASTREAMMODEL", "REQUESTALIVEVIDEO", "s-1")
            .with_parameter(json!({
                "CHANNEL": 5,
                "IPANDPORT": "10.0.0.1:5556",
                "NESTED": {"LIST": [1, 2, 3], "FLAG": true}
            }));

        let bytes = codec.encode(&Frame::signal(0, &signal)).unwrap();
        let (frame, _) = codec.decode(&bytes).unwrap();
        let decoded = frame.unwrap().parse_signal().unwrap();

        assert_eq!(decoded, signal);
    }

    #[test]
    fn test_oversized_payload_rejected_from_header_alone() {
        let codec = FrameCodec::new(HeaderProfile::default().max_payload_size(1024));

        // Only the header is present; the claimed 1 GiB never follows.
        let mut header = BytesMut::new();
        header.put_u8(0x80);
        header.put_u8(2);
        header.put_u16(5);
        header.put_u32(1 << 30);
        header.put_u32(0);

        let err = codec.decode(&header).unwrap_err();
        assert_eq!(
            err,
            FramingError::PayloadTooLarge {
                declared: 1 << 30,
                max: 1024
            }
        );

        let mut buffer = FrameBuffer::with_capacity(codec, 64);
        buffer.push(&header);
        assert!(buffer.next_frame().is_err());
        assert!(buffer.buffer_mut().capacity() < 1 << 30);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let codec = FrameCodec::new(HeaderProfile::default().max_payload_size(4));
        let result = codec.encode(&Frame::media(1, Bytes::from_static(&[0; 5])));
        assert!(matches!(result, Err(FramingError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let codec = FrameCodec::default();
        let mut frame = Frame::media(1, Bytes::from_static(&[1]));
        frame.version = 1;

        let lenient = FrameCodec::new(HeaderProfile::default().any_version());
        let bytes = lenient.encode(&frame).unwrap();

        assert_eq!(
            codec.decode(&bytes).unwrap_err(),
            FramingError::UnsupportedVersion(1)
        );
        assert_eq!(lenient.decode(&bytes).unwrap().0.unwrap().version, 1);
    }

    #[test]
    fn test_narrow_channel_out_of_range() {
        let codec = FrameCodec::default();
        let result = codec.encode(&Frame::media(70_000, Bytes::new()));
        assert_eq!(result, Err(FramingError::ChannelOutOfRange(70_000)));

        let wide = FrameCodec::new(HeaderProfile::default().wide_channel());
        let bytes = wide.encode(&Frame::media(70_000, Bytes::new())).unwrap();
        assert_eq!(wide.decode(&bytes).unwrap().0.unwrap().channel, 70_000);
    }

    #[test]
    fn test_reserved_payload_type_passes_through() {
        let codec = FrameCodec::default();
        let frame = Frame::new(PayloadType::Reserved(0x7F), 3, Bytes::from_static(b"x"));
        let bytes = codec.encode(&frame).unwrap();
        let (decoded, _) = codec.decode(&bytes).unwrap();
        assert_eq!(decoded.unwrap().payload_type, PayloadType::Reserved(0x7F));
    }

    #[test]
    fn test_reserved_too_wide_for_short_field() {
        let codec = FrameCodec::new(HeaderProfile::default().reserved_len(2));
        let mut frame = Frame::media(1, Bytes::from_static(b"x"));
        frame.reserved = 0x1_0000;
        assert_eq!(
            codec.encode(&frame),
            Err(FramingError::InvalidField("reserved"))
        );

        frame.reserved = 0xFFFF;
        let bytes = codec.encode(&frame).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap().0.unwrap().reserved, 0xFFFF);
    }

    #[test]
    fn test_header_only_frame_at_every_width() {
        let profiles = [
            HeaderProfile {
                reserved_width: ReservedWidth::Absent,
                ..HeaderProfile::default()
            },
            HeaderProfile {
                reserved_width: ReservedWidth::Short,
                ..HeaderProfile::default()
            },
            HeaderProfile::default().wide_channel(),
        ];

        for profile in profiles {
            let codec = FrameCodec::new(profile.clone());
            let bytes = codec.encode(&Frame::media(9, Bytes::new())).unwrap();
            assert_eq!(bytes.len(), profile.header_size());

            let (frame, used) = codec.decode(&bytes).unwrap();
            assert_eq!(used, profile.header_size());
            assert_eq!(frame.unwrap().channel, 9);

            // One byte short of a header is not a frame yet
            let short = &bytes[..bytes.len() - 1];
            assert_eq!(codec.decode(short).unwrap(), (None, 0));
        }
    }
}
