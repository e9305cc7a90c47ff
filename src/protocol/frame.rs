//! WebSocket frame codec (RFC 6455 Section 5.2).
//!
//! Client frames are always written with FIN set, never fragmented, and
//! masked with a fresh random key. Server frames are read by header
//! length only: the first byte is ignored since socket.io 0.9 servers
//! only send unmasked, unfragmented text frames.
//!
//! # Frame Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

// ============================================================================
// Imports
// ============================================================================

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Largest payload expressed directly in the 7-bit length field.
const MAX_SHORT_LENGTH: u64 = 125;

/// Length marker for a 16-bit extended length.
const LENGTH_16: u8 = 126;

/// Length marker for a 64-bit extended length.
const LENGTH_64: u8 = 127;

/// Upper bound on the payload buffer reserved before any payload byte is read.
const PREALLOCATE_LIMIT: u64 = 64 * 1024;

// ============================================================================
// Opcode
// ============================================================================

/// WebSocket frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation = 0x0,
    /// Text data frame.
    Text = 0x1,
    /// Binary data frame.
    Binary = 0x2,
    /// Connection close.
    Close = 0x8,
    /// Ping.
    Ping = 0x9,
    /// Pong.
    Pong = 0xA,
}

impl Opcode {
    /// Parses the low nibble of a frame's first byte.
    ///
    /// Returns `None` for reserved opcodes.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value & 0x0F {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single outgoing WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Frame {
    /// Final fragment flag. Always set by this client.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, present iff the frame is masked.
    pub mask_key: Option<[u8; 4]>,
    payload: Vec<u8>,
}

impl Frame {
    /// Creates an unmasked final frame.
    #[must_use]
    pub fn new(opcode: Opcode, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask_key: None,
            payload: payload.into(),
        }
    }

    /// Creates an unmasked text frame.
    #[inline]
    #[must_use]
    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(Opcode::Text, payload)
    }

    /// Masks the frame with a freshly generated key.
    #[must_use]
    pub fn masked(mut self) -> Self {
        self.mask_key = Some(generate_mask_key());
        self
    }

    /// Masks the frame with the given key.
    #[must_use]
    pub fn with_mask_key(mut self, key: [u8; 4]) -> Self {
        self.mask_key = Some(key);
        self
    }

    /// Returns the unmasked payload.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Returns the payload length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Serializes the frame to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let length = self.payload.len() as u64;

        let mut header = u16::from(self.fin);
        header = (header << 1) | u16::from(self.rsv1);
        header = (header << 1) | u16::from(self.rsv2);
        header = (header << 1) | u16::from(self.rsv3);
        header = (header << 4) | u16::from(self.opcode as u8);
        header = (header << 1) | u16::from(self.mask_key.is_some());

        let mut out = Vec::with_capacity(14 + self.payload.len());

        if length <= MAX_SHORT_LENGTH {
            header = (header << 7) | length as u16;
            out.extend_from_slice(&header.to_be_bytes());
        } else if length <= u64::from(u16::MAX) {
            header = (header << 7) | u16::from(LENGTH_16);
            out.extend_from_slice(&header.to_be_bytes());
            out.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            header = (header << 7) | u16::from(LENGTH_64);
            out.extend_from_slice(&header.to_be_bytes());
            out.extend_from_slice(&length.to_be_bytes());
        }

        match self.mask_key {
            Some(key) => {
                out.extend_from_slice(&key);
                let start = out.len();
                out.extend_from_slice(&self.payload);
                apply_mask(&mut out[start..], key);
            }
            None => out.extend_from_slice(&self.payload),
        }

        out
    }
}

// ============================================================================
// Masking
// ============================================================================

/// Generates a random 4-byte masking key.
#[inline]
#[must_use]
pub fn generate_mask_key() -> [u8; 4] {
    rand::random()
}

/// XORs `data` in place with `key[i % 4]`.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Returns `data` XORed with `key[i % 4]`.
///
/// Applying it twice with the same key yields the input.
#[must_use]
pub fn mask_data(data: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut masked = data.to_vec();
    apply_mask(&mut masked, key);
    masked
}

// ============================================================================
// FrameCodec
// ============================================================================

/// Encoder for client frames and decoder for server frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameCodec {
    /// Accept 64-bit extended lengths on decode.
    large_frames: bool,
}

impl FrameCodec {
    /// Creates a codec that rejects 64-bit extended lengths on decode.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            large_frames: false,
        }
    }

    /// Enables or disables decoding of 64-bit extended lengths.
    #[inline]
    #[must_use]
    pub const fn with_large_frames(mut self, enabled: bool) -> Self {
        self.large_frames = enabled;
        self
    }

    /// Returns `true` if 64-bit extended lengths are decoded.
    #[inline]
    #[must_use]
    pub const fn large_frames(&self) -> bool {
        self.large_frames
    }

    /// Encodes `payload` into a single final frame.
    #[must_use]
    pub fn encode(&self, payload: &[u8], opcode: Opcode, mask: bool) -> Vec<u8> {
        let frame = Frame::new(opcode, payload);
        if mask {
            frame.masked().encode()
        } else {
            frame.encode()
        }
    }

    /// Reads one server frame and returns its payload.
    ///
    /// The first header byte is ignored and the payload is never unmasked.
    /// When a 64-bit length is rejected, exactly 10 bytes have been
    /// consumed and none of the payload.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the stream ends mid-frame
    /// - [`Error::UnsupportedFrameSize`] for 64-bit lengths when large
    ///   frames are disabled
    pub async fn decode<R>(&self, reader: &mut R) -> Result<Vec<u8>>
    where
        R: AsyncRead + Unpin,
    {
        let mut header = [0u8; 2];
        read_full(reader, &mut header).await?;

        let length = match header[1] & 0x7F {
            LENGTH_16 => {
                let mut extended = [0u8; 2];
                read_full(reader, &mut extended).await?;
                u64::from(u16::from_be_bytes(extended))
            }
            LENGTH_64 => {
                let mut extended = [0u8; 8];
                read_full(reader, &mut extended).await?;
                let declared = u64::from_be_bytes(extended);
                if !self.large_frames {
                    return Err(Error::unsupported_frame_size(declared));
                }
                declared
            }
            short => u64::from(short),
        };

        // Grow with the bytes that actually arrive, not the declared length.
        let capacity = usize::try_from(length.min(PREALLOCATE_LIMIT))
            .map_err(|_| Error::unsupported_frame_size(length))?;
        let mut payload = Vec::with_capacity(capacity);
        let read = (&mut *reader).take(length).read_to_end(&mut payload).await?;
        if (read as u64) < length {
            return Err(Error::ConnectionClosed);
        }
        Ok(payload)
    }
}

/// Fills `buf`, tolerating partial reads.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }
        filled += n;
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn payload_of(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_short_text_header() {
        let bytes = FrameCodec::new().encode(b"2:::", Opcode::Text, false);
        assert_eq!(bytes, vec![0x81, 0x04, b'2', b':', b':', b':']);
    }

    #[test]
    fn test_masked_header_sets_mask_bit() {
        let bytes = FrameCodec::new().encode(b"hello", Opcode::Text, true);
        assert_eq!(bytes[0], 0x81);
        assert_eq!(bytes[1], 0x80 | 5);
        assert_eq!(bytes.len(), 2 + 4 + 5);
    }

    #[test]
    fn test_16_bit_length_header() {
        let bytes = FrameCodec::new().encode(&payload_of(300), Opcode::Text, false);
        assert_eq!(bytes[1], 126);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 300);
        assert_eq!(bytes.len(), 4 + 300);
    }

    #[test]
    fn test_64_bit_length_header() {
        let bytes = FrameCodec::new().encode(&payload_of(70_000), Opcode::Text, false);
        assert_eq!(bytes[1], 127);
        let mut length = [0u8; 8];
        length.copy_from_slice(&bytes[2..10]);
        assert_eq!(u64::from_be_bytes(length), 70_000);
        assert_eq!(bytes.len(), 10 + 70_000);
    }

    #[test]
    fn test_boundary_lengths_pick_smallest_form() {
        let codec = FrameCodec::new();
        assert_eq!(codec.encode(&payload_of(125), Opcode::Text, false)[1], 125);
        assert_eq!(codec.encode(&payload_of(126), Opcode::Text, false)[1], 126);
        assert_eq!(codec.encode(&payload_of(65_535), Opcode::Text, false)[1], 126);
        assert_eq!(codec.encode(&payload_of(65_536), Opcode::Text, false)[1], 127);
    }

    #[test]
    fn test_mask_key_follows_extended_length() {
        let payload = payload_of(300);
        let bytes = FrameCodec::new().encode(&payload, Opcode::Text, true);

        assert_eq!(bytes[1], 0x80 | 126);
        let key = [bytes[4], bytes[5], bytes[6], bytes[7]];
        assert_eq!(mask_data(&bytes[8..], key), payload);
    }

    #[test]
    fn test_fresh_mask_key_per_frame() {
        let codec = FrameCodec::new();
        let keys: Vec<[u8; 4]> = (0..8)
            .map(|_| {
                let bytes = codec.encode(b"x", Opcode::Text, true);
                [bytes[2], bytes[3], bytes[4], bytes[5]]
            })
            .collect();

        assert!(keys.windows(2).any(|pair| pair[0] != pair[1]));
    }

    #[test]
    fn test_frame_with_fixed_key() {
        let frame = Frame::text("abcd").with_mask_key([1, 2, 3, 4]);
        let bytes = frame.encode();
        assert_eq!(&bytes[2..6], &[1, 2, 3, 4]);
        assert_eq!(&bytes[6..], &[b'a' ^ 1, b'b' ^ 2, b'c' ^ 3, b'd' ^ 4]);
        assert_eq!(frame.payload(), b"abcd");
        assert_eq!(frame.len(), 4);
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(Opcode::from_u8(0x81), Some(Opcode::Text));
        assert_eq!(Opcode::from_u8(0x8), Some(Opcode::Close));
        assert_eq!(Opcode::from_u8(0x3), None);
    }

    #[tokio::test]
    async fn test_decode_round_trip_all_length_classes() {
        let codec = FrameCodec::new().with_large_frames(true);

        for len in [0, 1, 125, 126, 65_535, 65_536, 100_000] {
            let payload = payload_of(len);
            let bytes = codec.encode(&payload, Opcode::Text, false);
            let decoded = codec.decode(&mut bytes.as_slice()).await.unwrap();
            assert_eq!(decoded, payload, "length {len}");
        }
    }

    #[tokio::test]
    async fn test_decode_masked_after_unmask() {
        let codec = FrameCodec::new();
        let payload = b"5:::{\"name\":\"x\",\"args\":[]}".to_vec();
        let bytes = codec.encode(&payload, Opcode::Text, true);
        let key = [bytes[2], bytes[3], bytes[4], bytes[5]];

        let mut unmasked = vec![bytes[0], bytes[1] & 0x7F];
        unmasked.extend(mask_data(&bytes[6..], key));

        let decoded = codec.decode(&mut unmasked.as_slice()).await.unwrap();
        assert_eq!(decoded, payload);
    }

    #[tokio::test]
    async fn test_decode_partial_delivery() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&[0x81])
            .read(&[0x05, b'1'])
            .read(b":")
            .read(b":ab")
            .build();

        let decoded = FrameCodec::new().decode(&mut reader).await.unwrap();
        assert_eq!(decoded, b"1::ab");
    }

    #[tokio::test]
    async fn test_decode_leaves_following_frame_untouched() {
        let codec = FrameCodec::new();
        let mut bytes = codec.encode(b"1::", Opcode::Text, false);
        bytes.extend(codec.encode(b"2::", Opcode::Text, false));

        let mut reader = bytes.as_slice();
        assert_eq!(codec.decode(&mut reader).await.unwrap(), b"1::");
        assert_eq!(codec.decode(&mut reader).await.unwrap(), b"2::");
        assert!(reader.is_empty());
    }

    #[tokio::test]
    async fn test_decode_truncated_payload_is_connection_closed() {
        let bytes = [0x81, 0x05, b'a', b'b'];
        let result = FrameCodec::new().decode(&mut &bytes[..]).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_decode_empty_stream_is_connection_closed() {
        let result = FrameCodec::new().decode(&mut &b""[..]).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_decode_64_bit_length_rejected() {
        let bytes = FrameCodec::new().encode(&payload_of(70_000), Opcode::Text, false);
        let mut reader = bytes.as_slice();

        let result = FrameCodec::new().decode(&mut reader).await;

        assert!(matches!(
            result,
            Err(Error::UnsupportedFrameSize { declared: 70_000 })
        ));
        assert_eq!(reader.len(), 70_000);
    }

    #[tokio::test]
    async fn test_decode_huge_declared_length_is_connection_closed() {
        let mut bytes = vec![0x81, 127];
        bytes.extend_from_slice(&(i64::MAX as u64).to_be_bytes());
        bytes.extend_from_slice(b"only a few bytes");

        let codec = FrameCodec::new().with_large_frames(true);
        let result = codec.decode(&mut bytes.as_slice()).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_decode_large_frame_across_partial_reads() {
        let codec = FrameCodec::new().with_large_frames(true);
        let payload = payload_of(70_000);
        let bytes = codec.encode(&payload, Opcode::Text, false);

        let mut builder = tokio_test::io::Builder::new();
        for chunk in bytes.chunks(4096) {
            builder.read(chunk);
        }
        let mut reader = builder.build();

        assert_eq!(codec.decode(&mut reader).await.unwrap(), payload);
    }

    proptest! {
        #[test]
        fn prop_mask_is_self_inverse(data in proptest::collection::vec(any::<u8>(), 0..512), key in any::<[u8; 4]>()) {
            let once = mask_data(&data, key);
            prop_assert_eq!(mask_data(&once, key), data);
        }
    }
}
