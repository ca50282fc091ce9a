//! Primitive value encodings used by the snapshot stream.

use std::mem::size_of;

/// Kind byte stored in front of every field payload.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Bool = 0x01,
    U8 = 0x02,
    U16 = 0x03,
    U32 = 0x04,
    U64 = 0x05,
    I8 = 0x06,
    I16 = 0x07,
    I32 = 0x08,
    I64 = 0x09,
    Bytes = 0x0A,
}

/// Set on the kind byte of fixed-length arrays; the low bits carry the element kind.
pub(crate) const ARRAY_FLAG: u8 = 0x80;

impl ValueKind {
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A fixed-size value type that can be written to and read from a snapshot.
///
/// Only plain value types implement this, so loading a state never hands out
/// or frees heap memory owned by a component.
pub trait SnapshotValue: Copy + Default {
    const KIND: ValueKind;
    /// Encoded size in bytes.
    const SIZE: usize;

    fn encode(&self, out: &mut Vec<u8>);

    /// Decode from exactly `SIZE` bytes. `None` if the bytes are not a valid value.
    fn decode(bytes: &[u8]) -> Option<Self>;
}

macro_rules! int_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl SnapshotValue for $ty {
                const KIND: ValueKind = ValueKind::$kind;
                const SIZE: usize = size_of::<$ty>();

                #[inline]
                fn encode(&self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                #[inline]
                fn decode(bytes: &[u8]) -> Option<Self> {
                    Some(<$ty>::from_le_bytes(bytes.try_into().ok()?))
                }
            }
        )*
    };
}

int_value! {
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
}

impl SnapshotValue for bool {
    const KIND: ValueKind = ValueKind::Bool;
    const SIZE: usize = 1;

    #[inline]
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(u8::from(*self));
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut out = Vec::new();
        0x1234u16.encode(&mut out);
        0xDEAD_BEEFu32.encode(&mut out);
        assert_eq!(out, [0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn decode_rejects_wrong_width() {
        assert_eq!(u16::decode(&[1, 2, 3]), None);
        assert_eq!(i8::decode(&[0xFF]), Some(-1));
    }

    #[test]
    fn bool_only_accepts_zero_or_one() {
        assert_eq!(bool::decode(&[0]), Some(false));
        assert_eq!(bool::decode(&[1]), Some(true));
        assert_eq!(bool::decode(&[2]), None);
    }
}
