//! # ehpdecode — Electronic Horizon Profile decoder
//!
//! Decodes the little-endian UDP datagrams of an ADASIS-v3 style electronic
//! horizon ("EHP") signal matrix into typed records, and stitches identifier
//! lists that were split over several datagrams back together.
//!
//! ## Datagram structure
//!
//! - **Envelope** (`[0, 44)`): frame header (length, counter, type id, crc),
//!   timestamp block, multi-part descriptor, sub-protocol header. See [`frame`].
//! - **Profile preamble** (`[44, 71)`): present on profile messages only.
//! - **Body**: fixed fields, optionally followed by a repeated block whose count
//!   comes from the declared length, an explicit count field, or a constant.
//!   See [`layout`].
//!
//! The type id (`0x0300_0001` ..= `0x0300_0022`) selects a row of the
//! [`registry`]; unknown ids decode to [`MessageRecord::Unknown`].
//!
//! ## Usage
//!
//! ```no_run
//! use ehpdecode::{decode_message, MessageRecord};
//!
//! # let datagram: Vec<u8> = Vec::new();
//! match decode_message(&datagram)? {
//!     MessageRecord::FormOfWay(m) => println!("{} -> {}", m.profile.instance_id, m.body.link_form_of_way),
//!     other => println!("{}", other.kind_name()),
//! }
//! # Ok::<(), ehpdecode::DecodeError>(())
//! ```
//!
//! Outer layers: [`capture`] reads pcap/pcapng files, [`replay`] resends them
//! over UDP, [`linkmap`] collects per-link attributes, [`dump`] renders text.

pub mod capture;
pub mod codec;
pub mod dump;
pub mod frame;
pub mod layout;
pub mod linkmap;
pub mod merge;
pub mod record;
pub mod registry;
pub mod replay;
pub mod value;

pub use capture::{read_capture_file, CaptureError, CaptureStats, CapturedDatagram, CapturedPayload};
pub use codec::{decode_fields, decode_record, DecodeError, DecodeWarning, Record};
pub use frame::{
    decode_batch, parse_header, parse_multi_part, parse_sub_protocol_header, parse_timestamp,
    BatchDecodeResult, DecodedDatagram, Envelope, FrameHeader, MultiPartDescriptor, RejectedDatagram,
};
pub use linkmap::{LinkAttributes, LinkMap};
pub use merge::{BundleReassembler, ReassemblySession};
pub use record::{MessageRecord, ProfileHeader};
pub use registry::{decode_message, decode_message_with_warnings, MessageKind};
pub use replay::{replay, ReplayConfig, ReplayError};
pub use value::{FieldType, Value};
