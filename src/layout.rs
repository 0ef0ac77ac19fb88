//! Declarative message layouts and the engine that executes them.
//!
//! A [`Layout`] says where the message body starts ([`Preamble`]), which fixed
//! fields follow, and whether a repeated block of fixed-size elements closes the
//! message. The number of elements comes from a [`CountRule`]:
//!
//! | Rule | Count |
//! |------|-------|
//! | [`CountRule::FromLength`] | `(length + 12 - element_start) / element_size`, must divide exactly |
//! | [`CountRule::Explicit`] | last fixed field |
//! | [`CountRule::ExplicitAligned`] | last fixed field; the declared length must still divide exactly |
//! | [`CountRule::Fixed`] | constant |
//!
//! `element_start` is the first byte after the fixed fields, so an in-message
//! count byte is part of the prefix. An explicit count that disagrees with the
//! declared length is trusted and reported as a
//! [`DecodeWarning::LengthInconsistency`]; for plain `Explicit` rows a length
//! that leaves a partial element or falls short of the prefix is reported the
//! same way, with the implied count rounded down.

use crate::codec::{decode_fields, decode_record, DecodeError, DecodeWarning, Fields, Record};
use crate::frame::{FrameHeader, ENVELOPE_LEN};
use crate::record::{ListMessage, ProfileHeader, Profiled, ProfiledList};
use crate::registry::MessageKind;
use crate::value::{layout_width, FieldType, Value};

/// Offset of the first message-specific field in profile messages.
pub const PROFILE_BODY_START: usize = ENVELOPE_LEN + ProfileHeader::WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preamble {
    /// Fields start right after the sub-protocol header (offset 44).
    SubProtocol,
    /// A [`ProfileHeader`] occupies `[44, 71)`; fields start at 71.
    Profile,
}

impl Preamble {
    pub const fn body_start(self) -> usize {
        match self {
            Preamble::SubProtocol => ENVELOPE_LEN,
            Preamble::Profile => PROFILE_BODY_START,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountRule {
    FromLength,
    /// The last fixed field holds the element count.
    Explicit,
    /// Like `Explicit`, but a declared length that is not a whole number of
    /// elements is a [`DecodeError::LayoutMismatch`].
    ExplicitAligned,
    Fixed(usize),
}

impl CountRule {
    pub const fn is_explicit(self) -> bool {
        matches!(self, CountRule::Explicit | CountRule::ExplicitAligned)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RepeatedBlock {
    pub element: &'static [FieldType],
    pub count: CountRule,
}

#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub preamble: Preamble,
    pub fixed: &'static [FieldType],
    pub repeated: Option<RepeatedBlock>,
}

impl Layout {
    /// First byte after preamble and fixed fields.
    pub const fn element_start(&self) -> usize {
        self.preamble.body_start() + layout_width(self.fixed)
    }

    pub const fn element_size(&self) -> Option<usize> {
        match &self.repeated {
            Some(block) => Some(layout_width(block.element)),
            None => None,
        }
    }
}

/// Raw output of the engine, before it is shaped into a typed record.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub kind: MessageKind,
    pub profile: Option<ProfileHeader>,
    pub fixed: Vec<Value>,
    pub elements: Vec<Vec<Value>>,
}

impl Decoded {
    pub fn plain<B: Record>(self) -> Result<B, DecodeError> {
        B::from_fields(&mut Fields::new(self.fixed))
    }

    pub fn list<H: Record, E: Record>(self) -> Result<ListMessage<H, E>, DecodeError> {
        let header = H::from_fields(&mut Fields::new(self.fixed))?;
        let items = collect_elements(self.elements)?;
        Ok(ListMessage { header, items })
    }

    pub fn profiled<B: Record>(self) -> Result<Profiled<B>, DecodeError> {
        let profile = self.profile.ok_or(DecodeError::MissingProfile(self.kind))?;
        let body = B::from_fields(&mut Fields::new(self.fixed))?;
        Ok(Profiled { profile, body })
    }

    pub fn profiled_list<H: Record, E: Record>(self) -> Result<ProfiledList<H, E>, DecodeError> {
        let profile = self.profile.ok_or(DecodeError::MissingProfile(self.kind))?;
        let header = H::from_fields(&mut Fields::new(self.fixed))?;
        let items = collect_elements(self.elements)?;
        Ok(ProfiledList {
            profile,
            header,
            items,
        })
    }
}

fn collect_elements<E: Record>(elements: Vec<Vec<Value>>) -> Result<Vec<E>, DecodeError> {
    elements
        .into_iter()
        .map(|values| E::from_fields(&mut Fields::new(values)))
        .collect()
}

/// Run `layout` over `buffer`. Non-fatal findings are appended to `warnings`.
pub fn decode_layout(
    buffer: &[u8],
    header: &FrameHeader,
    kind: MessageKind,
    layout: &Layout,
    warnings: &mut Vec<DecodeWarning>,
) -> Result<Decoded, DecodeError> {
    let profile = match layout.preamble {
        Preamble::Profile => Some(decode_record::<ProfileHeader>(buffer, ENVELOPE_LEN)?),
        Preamble::SubProtocol => None,
    };
    let body_start = layout.preamble.body_start();
    let element_start = layout.element_start();
    let fixed = decode_fields(buffer, body_start, element_start, layout.fixed)?;

    let elements = match &layout.repeated {
        None => Vec::new(),
        Some(block) => {
            let size = layout_width(block.element);
            let count = element_count(header, kind, element_start, size, block.count, &fixed, warnings)?;
            let needed = count * size;
            if element_start + needed > buffer.len() {
                return Err(DecodeError::TruncatedBuffer {
                    offset: element_start,
                    needed,
                    available: buffer.len().saturating_sub(element_start),
                });
            }
            (0..count)
                .map(|i| {
                    let start = element_start + i * size;
                    decode_fields(buffer, start, start + size, block.element)
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Decoded {
        kind,
        profile,
        fixed,
        elements,
    })
}

/// Elements implied by the declared length: `(length + 12 - element_start) / element_size`.
pub fn count_from_length(
    header: &FrameHeader,
    kind: MessageKind,
    element_start: usize,
    element_size: usize,
) -> Result<usize, DecodeError> {
    let declared = header.declared_total();
    let mismatch = DecodeError::LayoutMismatch {
        kind,
        declared,
        element_start,
        element_size,
    };
    if element_size == 0 || declared < element_start {
        return Err(mismatch);
    }
    let tail = declared - element_start;
    if tail % element_size != 0 {
        return Err(mismatch);
    }
    Ok(tail / element_size)
}

/// Floor of the count formula, and whether it divided exactly. A length that
/// ends before `element_start` implies zero elements and is not exact.
fn implied_count(header: &FrameHeader, element_start: usize, element_size: usize) -> (usize, bool) {
    let tail = header.declared_total().saturating_sub(element_start);
    let exact = element_size != 0 && header.declared_total() >= element_start && tail % element_size == 0;
    (tail.checked_div(element_size).unwrap_or(0), exact)
}

fn element_count(
    header: &FrameHeader,
    kind: MessageKind,
    element_start: usize,
    element_size: usize,
    rule: CountRule,
    fixed: &[Value],
    warnings: &mut Vec<DecodeWarning>,
) -> Result<usize, DecodeError> {
    let explicit = match rule {
        CountRule::FromLength => return count_from_length(header, kind, element_start, element_size),
        CountRule::Fixed(n) => return Ok(n),
        CountRule::Explicit | CountRule::ExplicitAligned => {
            let last = fixed.last().copied();
            last.and_then(|v| v.as_u64()).ok_or(DecodeError::FieldMismatch {
                expected: FieldType::U16,
                found: last.map(|v| v.field_type()),
            })? as usize
        }
    };
    let (implied, exact) = if rule == CountRule::ExplicitAligned {
        (count_from_length(header, kind, element_start, element_size)?, true)
    } else {
        implied_count(header, element_start, element_size)
    };
    if implied != explicit || !exact {
        tracing::warn!(
            %kind,
            implied,
            explicit,
            declared_length = header.length,
            "explicit element count disagrees with declared length; using explicit count"
        );
        warnings.push(DecodeWarning::LengthInconsistency {
            kind,
            implied,
            explicit,
        });
    }
    Ok(explicit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(length: u16) -> FrameHeader {
        FrameHeader {
            length,
            counter: 0,
            message_type_id: MessageKind::LaneModel.type_id(),
            crc: 0,
        }
    }

    #[test]
    fn body_starts() {
        assert_eq!(Preamble::SubProtocol.body_start(), 44);
        assert_eq!(Preamble::Profile.body_start(), 71);
    }

    #[test]
    fn count_from_length_divides_exactly() {
        // 72 + 2 * 23 = 118 bytes in total.
        let h = header(118 - 12);
        assert_eq!(count_from_length(&h, MessageKind::LaneModel, 72, 23).expect("count"), 2);
        let h = header(72 - 12);
        assert_eq!(count_from_length(&h, MessageKind::LaneModel, 72, 23).expect("count"), 0);
    }

    #[test]
    fn count_from_length_rejects_remainder_and_negative_tail() {
        let h = header(119 - 12);
        assert!(count_from_length(&h, MessageKind::LaneModel, 72, 23)
            .unwrap_err()
            .is_layout_mismatch());
        let h = header(60 - 12);
        assert!(count_from_length(&h, MessageKind::LaneModel, 72, 23)
            .unwrap_err()
            .is_layout_mismatch());
    }

    #[test]
    fn explicit_count_wins_and_warns() {
        let h = header(72 + 3 * 8 - 12);
        let mut warnings = Vec::new();
        let n = element_count(
            &h,
            MessageKind::Curvature,
            72,
            8,
            CountRule::ExplicitAligned,
            &[Value::U8(2)],
            &mut warnings,
        )
        .expect("count");
        assert_eq!(n, 2);
        assert_eq!(
            warnings,
            vec![DecodeWarning::LengthInconsistency {
                kind: MessageKind::Curvature,
                implied: 3,
                explicit: 2
            }]
        );
    }

    #[test]
    fn plain_explicit_tolerates_partial_element() {
        // 50-byte prefix, two 4-byte ids and one pad byte.
        let h = header(50 + 2 * 4 + 1 - 12);
        let mut warnings = Vec::new();
        let n = element_count(
            &h,
            MessageKind::RouteList,
            50,
            4,
            CountRule::Explicit,
            &[Value::U32(1), Value::U16(2)],
            &mut warnings,
        )
        .expect("count");
        assert_eq!(n, 2);
        assert_eq!(
            warnings,
            vec![DecodeWarning::LengthInconsistency {
                kind: MessageKind::RouteList,
                implied: 2,
                explicit: 2
            }]
        );

        let mut warnings = Vec::new();
        let short = header(0);
        let n = element_count(
            &short,
            MessageKind::RouteList,
            50,
            4,
            CountRule::Explicit,
            &[Value::U32(1), Value::U16(2)],
            &mut warnings,
        )
        .expect("count");
        assert_eq!(n, 2);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn aligned_explicit_rejects_partial_element() {
        let h = header(72 + 8 + 1 - 12);
        let err = element_count(
            &h,
            MessageKind::Curvature,
            72,
            8,
            CountRule::ExplicitAligned,
            &[Value::U8(1)],
            &mut Vec::new(),
        )
        .unwrap_err();
        assert!(err.is_layout_mismatch());
    }
}
