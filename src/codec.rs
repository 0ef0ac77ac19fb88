//! Field codec: decode fixed-width little-endian fields at caller-specified offsets.
//!
//! [`decode_fields`] is the primitive: a byte span plus a list of [`FieldType`]s
//! yields one [`Value`] per entry. Typed records are layered on top through the
//! [`Record`] trait; the `record!` macro declares a struct and derives its
//! layout from the field types, so the layout and the struct cannot drift.

use crate::registry::MessageKind;
use crate::value::{layout_width, FieldType, FromValue, Value};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Truncated buffer: span at offset {offset} needs {needed} bytes, {available} available")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error(
        "Layout mismatch ({kind}): {declared} declared bytes do not hold whole {element_size}-byte elements after offset {element_start}"
    )]
    LayoutMismatch {
        kind: MessageKind,
        declared: usize,
        element_start: usize,
        element_size: usize,
    },
    #[error("Field mismatch: expected {expected:?}, found {found:?}")]
    FieldMismatch {
        expected: FieldType,
        found: Option<FieldType>,
    },
    #[error("{0} decoded without its profile preamble")]
    MissingProfile(MessageKind),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

impl DecodeError {
    pub fn is_truncated(&self) -> bool {
        matches!(self, DecodeError::TruncatedBuffer { .. })
    }

    pub fn is_layout_mismatch(&self) -> bool {
        matches!(self, DecodeError::LayoutMismatch { .. })
    }
}

/// Non-fatal findings raised while decoding a datagram.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeWarning {
    #[error("Length inconsistency ({kind}): declared length implies {implied} elements, message says {explicit}")]
    LengthInconsistency {
        kind: MessageKind,
        implied: usize,
        explicit: usize,
    },
}

/// Decode `layout` from `buffer[start..end]`.
///
/// The span must lie inside the buffer and be exactly as wide as the layout.
pub fn decode_fields(
    buffer: &[u8],
    start: usize,
    end: usize,
    layout: &[FieldType],
) -> Result<Vec<Value>, DecodeError> {
    let width = layout_width(layout);
    if start > end || end - start != width {
        return Err(DecodeError::TruncatedBuffer {
            offset: start,
            needed: width,
            available: end.saturating_sub(start),
        });
    }
    if end > buffer.len() {
        return Err(DecodeError::TruncatedBuffer {
            offset: start,
            needed: width,
            available: buffer.len().saturating_sub(start),
        });
    }
    let mut r = Cursor::new(&buffer[start..end]);
    layout.iter().map(|ft| read_value(&mut r, *ft)).collect()
}

fn read_value(r: &mut Cursor<&[u8]>, ft: FieldType) -> Result<Value, DecodeError> {
    Ok(match ft {
        FieldType::U8 => Value::U8(r.read_u8()?),
        FieldType::I8 => Value::I8(r.read_i8()?),
        FieldType::Bool => Value::Bool(r.read_u8()? != 0),
        FieldType::U16 => Value::U16(r.read_u16::<LittleEndian>()?),
        FieldType::I16 => Value::I16(r.read_i16::<LittleEndian>()?),
        FieldType::U32 => Value::U32(r.read_u32::<LittleEndian>()?),
        FieldType::I32 => Value::I32(r.read_i32::<LittleEndian>()?),
        FieldType::U64 => Value::U64(r.read_u64::<LittleEndian>()?),
        FieldType::I64 => Value::I64(r.read_i64::<LittleEndian>()?),
        FieldType::F32 => Value::F32(r.read_f32::<LittleEndian>()?),
    })
}

/// Decoded values consumed in layout order.
#[derive(Debug, Clone)]
pub struct Fields {
    values: std::vec::IntoIter<Value>,
}

impl Fields {
    pub fn new(values: Vec<Value>) -> Self {
        Fields {
            values: values.into_iter(),
        }
    }

    /// Take the next value as `T`.
    pub fn take<T: FromValue>(&mut self) -> Result<T, DecodeError> {
        let next = self.values.next();
        next.and_then(T::from_value)
            .ok_or(DecodeError::FieldMismatch {
                expected: T::FIELD,
                found: next.map(|v| v.field_type()),
            })
    }
}

/// A fixed-layout structure that can be assembled from decoded values.
pub trait Record: Sized {
    const LAYOUT: &'static [FieldType];
    const WIDTH: usize = layout_width(Self::LAYOUT);

    fn from_fields(fields: &mut Fields) -> Result<Self, DecodeError>;
}

/// No fields at all (messages whose body is only a repeated block).
impl Record for () {
    const LAYOUT: &'static [FieldType] = &[];

    fn from_fields(_fields: &mut Fields) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! impl_scalar_record {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Record for $ty {
                const LAYOUT: &'static [FieldType] = &[<$ty as FromValue>::FIELD];

                fn from_fields(fields: &mut Fields) -> Result<Self, DecodeError> {
                    fields.take()
                }
            }
        )*
    };
}

// A bare scalar is a one-field record (identifier lists, nested fields).
impl_scalar_record!(u8, i8, bool, u16, i16, u32, i32, u64, i64, f32);

/// Concatenate layouts into one array of exactly `N` entries.
pub const fn concat_layouts<const N: usize>(parts: &[&[FieldType]]) -> [FieldType; N] {
    let mut out = [FieldType::U8; N];
    let mut k = 0;
    let mut p = 0;
    while p < parts.len() {
        let part = parts[p];
        let mut i = 0;
        while i < part.len() {
            out[k] = part[i];
            k += 1;
            i += 1;
        }
        p += 1;
    }
    assert!(k == N, "layout length mismatch");
    out
}

/// Decode one `R` starting at `start`.
pub fn decode_record<R: Record>(buffer: &[u8], start: usize) -> Result<R, DecodeError> {
    let values = decode_fields(buffer, start, start + R::WIDTH, R::LAYOUT)?;
    R::from_fields(&mut Fields::new(values))
}

/// Declare plain-data structs whose [`Record`] layout follows the field order.
///
/// Fields may be scalars or other records; nested layouts are spliced in place.
macro_rules! record {
    ($(
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* pub $field:ident : $ty:ty ),* $(,)?
        }
    )*) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $crate::codec::Record for $name {
            const LAYOUT: &'static [$crate::value::FieldType] =
                &$crate::codec::concat_layouts::<{ 0 $( + <$ty as $crate::codec::Record>::LAYOUT.len() )* }>(
                    &[$( <$ty as $crate::codec::Record>::LAYOUT ),*],
                );

            fn from_fields(
                fields: &mut $crate::codec::Fields,
            ) -> Result<Self, $crate::codec::DecodeError> {
                Ok(Self {
                    $( $field: <$ty as $crate::codec::Record>::from_fields(fields)?, )*
                })
            }
        }
    )*};
}

pub(crate) use record;
