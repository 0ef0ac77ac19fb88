//! Frame handling: the envelope shared by every datagram, and batch decoding.
//!
//! Byte map of the envelope (all little-endian):
//!
//! | Span | Part |
//! |------|------|
//! | `[0, 12)` | [`FrameHeader`]: length, counter, message type id, crc |
//! | `[12, 32)` | [`TimestampBlock`] |
//! | `[32, 40)` | [`MultiPartDescriptor`]: part count, part index, bundle id |
//! | `[40, 44)` | [`SubProtocolHeader`] |
//!
//! A datagram that fails to decode is reported and skipped; it never stops the
//! rest of a batch.

use crate::codec::{decode_record, record, DecodeError, Record};
use crate::record::MessageRecord;
use crate::registry::decode_message;

/// Size of [`FrameHeader`]; the declared `length` excludes it.
pub const HEADER_LEN: usize = 12;
pub const TIMESTAMP_OFFSET: usize = 12;
pub const MULTI_PART_OFFSET: usize = 32;
pub const SUB_PROTOCOL_OFFSET: usize = 40;
/// First byte after the envelope; no message-specific field starts earlier.
pub const ENVELOPE_LEN: usize = 44;

record! {
    /// Outer header of every datagram.
    pub struct FrameHeader {
        /// Payload length, not counting this 12-byte header.
        pub length: u16,
        pub counter: u16,
        pub message_type_id: u32,
        pub crc: u32,
    }

    pub struct TimestampBlock {
        pub reserved: u8,
        pub utc_valid: u8,
        pub utc_week: u16,
        pub utc_microseconds: u64,
        pub utc_systime: u64,
    }

    /// Position of this datagram inside a bundle split over several datagrams.
    pub struct MultiPartDescriptor {
        pub part_count: u16,
        pub part_index: u16,
        pub bundle_id: u32,
    }

    pub struct SubProtocolHeader {
        pub reserved: u8,
        pub cyclic_counter: u8,
        pub message_kind: u8,
        pub message_count: u8,
    }
}

impl FrameHeader {
    /// Buffer length implied by the declared payload length.
    pub fn declared_total(&self) -> usize {
        self.length as usize + HEADER_LEN
    }
}

impl MultiPartDescriptor {
    pub fn is_split(&self) -> bool {
        self.part_count > 1
    }
}

pub fn parse_header(buffer: &[u8]) -> Result<FrameHeader, DecodeError> {
    decode_record(buffer, 0)
}

pub fn parse_timestamp(buffer: &[u8]) -> Result<TimestampBlock, DecodeError> {
    decode_record(buffer, TIMESTAMP_OFFSET)
}

pub fn parse_multi_part(buffer: &[u8]) -> Result<MultiPartDescriptor, DecodeError> {
    decode_record(buffer, MULTI_PART_OFFSET)
}

pub fn parse_sub_protocol_header(buffer: &[u8]) -> Result<SubProtocolHeader, DecodeError> {
    decode_record(buffer, SUB_PROTOCOL_OFFSET)
}

/// Everything in front of the message-specific fields.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Envelope {
    pub header: FrameHeader,
    pub timestamp: TimestampBlock,
    pub multi_part: MultiPartDescriptor,
    pub sub_protocol: SubProtocolHeader,
}

impl Envelope {
    pub fn parse(buffer: &[u8]) -> Result<Self, DecodeError> {
        if buffer.len() < ENVELOPE_LEN {
            return Err(DecodeError::TruncatedBuffer {
                offset: 0,
                needed: ENVELOPE_LEN,
                available: buffer.len(),
            });
        }
        Ok(Envelope {
            header: parse_header(buffer)?,
            timestamp: parse_timestamp(buffer)?,
            multi_part: parse_multi_part(buffer)?,
            sub_protocol: parse_sub_protocol_header(buffer)?,
        })
    }
}

const _: () = assert!(
    FrameHeader::WIDTH + TimestampBlock::WIDTH + MultiPartDescriptor::WIDTH + SubProtocolHeader::WIDTH
        == ENVELOPE_LEN
);

/// Result of decoding a batch: datagrams that decoded and datagrams that were rejected.
#[derive(Debug, Default)]
pub struct BatchDecodeResult {
    pub decoded: Vec<DecodedDatagram>,
    pub rejected: Vec<RejectedDatagram>,
}

#[derive(Debug)]
pub struct DecodedDatagram {
    /// Position of the datagram in the input batch.
    pub index: usize,
    pub envelope: Envelope,
    pub record: MessageRecord,
}

#[derive(Debug)]
pub struct RejectedDatagram {
    pub index: usize,
    pub len: usize,
    pub reason: DecodeError,
}

/// Decode every datagram in `datagrams`; failures are collected, not propagated.
pub fn decode_batch<'a, I>(datagrams: I) -> BatchDecodeResult
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut result = BatchDecodeResult::default();
    for (index, buffer) in datagrams.into_iter().enumerate() {
        let decoded = Envelope::parse(buffer)
            .and_then(|envelope| decode_message(buffer).map(|record| (envelope, record)));
        match decoded {
            Ok((envelope, record)) => {
                tracing::trace!(index, kind = record.kind_name(), "decoded datagram");
                result.decoded.push(DecodedDatagram {
                    index,
                    envelope,
                    record,
                });
            }
            Err(reason) => {
                tracing::debug!(index, len = buffer.len(), %reason, "rejected datagram");
                result.rejected.push(RejectedDatagram {
                    index,
                    len: buffer.len(),
                    reason,
                });
            }
        }
    }
    result
}
