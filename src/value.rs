//! Primitive field types and decoded scalar values (field codec representation).

use serde::Serialize;

/// Wire type of one fixed-width field. All multi-byte types are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FieldType {
    U8,
    I8,
    /// One byte; any non-zero value decodes as `true`.
    Bool,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
}

impl FieldType {
    /// Width of the field on the wire, in bytes.
    pub const fn width(self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 | FieldType::Bool => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
            FieldType::U64 | FieldType::I64 => 8,
        }
    }
}

/// Sum of the byte widths of `layout`.
pub const fn layout_width(layout: &[FieldType]) -> usize {
    let mut width = 0;
    let mut i = 0;
    while i < layout.len() {
        width += layout[i].width();
        i += 1;
    }
    width
}

/// A single decoded scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Value {
    U8(u8),
    I8(i8),
    Bool(bool),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::U8(_) => FieldType::U8,
            Value::I8(_) => FieldType::I8,
            Value::Bool(_) => FieldType::Bool,
            Value::U16(_) => FieldType::U16,
            Value::I16(_) => FieldType::I16,
            Value::U32(_) => FieldType::U32,
            Value::I32(_) => FieldType::I32,
            Value::U64(_) => FieldType::U64,
            Value::I64(_) => FieldType::I64,
            Value::F32(_) => FieldType::F32,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U8(x) => Some(*x as u64),
            Value::U16(x) => Some(*x as u64),
            Value::U32(x) => Some(*x as u64),
            Value::U64(x) => Some(*x),
            _ => None,
        }
    }
}

/// Rust scalar types that map one-to-one onto a [`FieldType`].
pub trait FromValue: Sized {
    const FIELD: FieldType;

    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const FIELD: FieldType = FieldType::$variant;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(x) => Some(x),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    u8 => U8,
    i8 => I8,
    bool => Bool,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f32 => F32,
}
