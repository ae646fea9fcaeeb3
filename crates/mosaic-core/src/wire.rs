//! Mosaic wire format — one fragment per datagram.
//!
//! ```text
//! offset 0:  u16 flags            nonzero => end-of-message fragment
//! offset 2:  u16 data_length
//! offset 4:  u32 transaction_id
//! offset 8:  u32 fragment offset
//! offset 12: [u8; data_length]    payload
//! ```
//!
//! All integers are big-endian, no padding. The decoder reads field by field
//! so a truncated datagram is attributed to the exact field that could not be
//! read. The encoder goes through [`WireHeader`], a zerocopy view whose size
//! is pinned at compile time.

use std::io::{self, Read};

use bytes::{BufMut, Bytes, BytesMut};
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Header ────────────────────────────────────────────────────────────────────

/// Big-endian on-wire header. Only used to produce the wire image; decoding
/// goes through [`decode`] for per-field error attribution.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct WireHeader {
    pub flags: U16<BigEndian>,
    pub data_length: U16<BigEndian>,
    pub transaction_id: U32<BigEndian>,
    pub offset: U32<BigEndian>,
}

assert_eq_size!(WireHeader, [u8; HEADER_LEN]);

/// Decoded fragment header. Immutable once decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub is_end: bool,
    pub data_length: u16,
    pub transaction_id: u32,
    pub offset: u32,
}

impl FragmentHeader {
    /// First byte past this fragment's payload.
    ///
    /// Computed in `u64` so an end fragment close to `u32::MAX` cannot wrap.
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.data_length)
    }
}

impl From<&FragmentHeader> for WireHeader {
    fn from(h: &FragmentHeader) -> Self {
        WireHeader {
            flags: U16::new(if h.is_end { FLAG_END } else { 0 }),
            data_length: U16::new(h.data_length),
            transaction_id: U32::new(h.transaction_id),
            offset: U32::new(h.offset),
        }
    }
}

// ── Fragment ──────────────────────────────────────────────────────────────────

/// One decoded unit of the protocol: header plus its payload.
///
/// `data.len() == header.data_length` always holds; both constructors
/// ([`Fragment::new`] and [`decode`]) enforce it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    header: FragmentHeader,
    data: Bytes,
}

impl Fragment {
    pub fn new(
        is_end: bool,
        transaction_id: u32,
        offset: u32,
        data: impl Into<Bytes>,
    ) -> Result<Self, WireError> {
        let data = data.into();
        let data_length =
            u16::try_from(data.len()).map_err(|_| WireError::PayloadTooLarge(data.len()))?;
        Ok(Self {
            header: FragmentHeader {
                is_end,
                data_length,
                transaction_id,
                offset,
            },
            data,
        })
    }

    pub fn header(&self) -> &FragmentHeader {
        &self.header
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn transaction_id(&self) -> u32 {
        self.header.transaction_id
    }

    pub fn offset(&self) -> u32 {
        self.header.offset
    }

    pub fn data_length(&self) -> u16 {
        self.header.data_length
    }

    pub fn is_end(&self) -> bool {
        self.header.is_end
    }

    pub fn end(&self) -> u64 {
        self.header.end()
    }

    /// Serialize to the wire image: 12-byte header followed by the payload.
    pub fn encode(&self) -> Bytes {
        let header = WireHeader::from(&self.header);
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.data.len());
        buf.put_slice(header.as_bytes());
        buf.put_slice(&self.data);
        buf.freeze()
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Read one fragment from `reader`.
///
/// Consumes exactly `HEADER_LEN + data_length` bytes on success. Any short
/// read fails with the [`DecodeError`] variant of the field being read; a
/// partially decoded fragment is never returned.
pub fn decode<R: Read + ?Sized>(reader: &mut R) -> Result<Fragment, DecodeError> {
    let flags = read_u16(reader).map_err(DecodeError::Flags)?;
    let data_length = read_u16(reader).map_err(DecodeError::DataLength)?;
    let transaction_id = read_u32(reader).map_err(DecodeError::TransactionId)?;
    let offset = read_u32(reader).map_err(DecodeError::Offset)?;

    let mut data = vec![0u8; usize::from(data_length)];
    reader.read_exact(&mut data).map_err(DecodeError::Payload)?;

    Ok(Fragment {
        header: FragmentHeader {
            is_end: flags != 0,
            data_length,
            transaction_id,
            offset,
        },
        data: Bytes::from(data),
    })
}

/// Decode a whole datagram. Trailing bytes past the payload are ignored.
pub fn decode_datagram(mut datagram: &[u8]) -> Result<Fragment, DecodeError> {
    decode(&mut datagram)
}

fn read_u16<R: Read + ?Sized>(reader: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_u32<R: Read + ?Sized>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of the fixed header preceding every payload.
pub const HEADER_LEN: usize = 12;

/// Flag value written for end-of-message fragments. Any nonzero value is
/// accepted on decode.
pub const FLAG_END: u16 = 0x0001;

/// Largest payload a single fragment can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Largest datagram a well-formed fragment can occupy.
pub const MAX_DATAGRAM: usize = HEADER_LEN + MAX_PAYLOAD;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Header fields, in wire order. Used to attribute decode failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireField {
    Flags,
    DataLength,
    TransactionId,
    Offset,
    Payload,
}

impl std::fmt::Display for WireField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WireField::Flags => "flags",
            WireField::DataLength => "data length",
            WireField::TransactionId => "transaction id",
            WireField::Offset => "offset",
            WireField::Payload => "payload",
        };
        f.write_str(name)
    }
}

/// Malformed or truncated wire data. Fatal to the datagram, never to the engine.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unable to read flags: {0}")]
    Flags(#[source] io::Error),

    #[error("unable to read data length: {0}")]
    DataLength(#[source] io::Error),

    #[error("unable to read transaction id: {0}")]
    TransactionId(#[source] io::Error),

    #[error("unable to read offset: {0}")]
    Offset(#[source] io::Error),

    #[error("unable to read payload: {0}")]
    Payload(#[source] io::Error),
}

impl DecodeError {
    pub fn field(&self) -> WireField {
        match self {
            DecodeError::Flags(_) => WireField::Flags,
            DecodeError::DataLength(_) => WireField::DataLength,
            DecodeError::TransactionId(_) => WireField::TransactionId,
            DecodeError::Offset(_) => WireField::Offset,
            DecodeError::Payload(_) => WireField::Payload,
        }
    }

    fn io(&self) -> &io::Error {
        match self {
            DecodeError::Flags(e)
            | DecodeError::DataLength(e)
            | DecodeError::TransactionId(e)
            | DecodeError::Offset(e)
            | DecodeError::Payload(e) => e,
        }
    }

    /// True when the source timed out rather than ran dry. Blocking readers
    /// with a read deadline report this; callers usually just retry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self.io().kind(),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
        )
    }
}

/// Errors building a fragment for the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
