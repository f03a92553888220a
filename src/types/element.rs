//! Element types carried by streams

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Supported stream element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// 8-bit signed integer (char streams)
    Int8,
    /// 8-bit unsigned integer (octet streams)
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    /// Opaque record (string) element; numeric-only operations do not apply
    Record,
}

impl ElementKind {
    /// Size in bytes of one element, or `None` for records.
    pub const fn size(&self) -> Option<usize> {
        match self {
            ElementKind::Int8 | ElementKind::UInt8 => Some(1),
            ElementKind::Int16 | ElementKind::UInt16 => Some(2),
            ElementKind::Int32 | ElementKind::UInt32 | ElementKind::Float32 => Some(4),
            ElementKind::Int64 | ElementKind::UInt64 | ElementKind::Float64 => Some(8),
            ElementKind::Record => None,
        }
    }

    /// Whether this kind supports numeric operations, including complex views.
    pub const fn is_numeric(&self) -> bool {
        !matches!(self, ElementKind::Record)
    }
}

/// A type that can be carried by a stream.
pub trait Element: Clone + Debug + Send + Sync + 'static {
    const KIND: ElementKind;
}

/// A numeric element that can be viewed as raw memory and paired into complex
/// samples.
pub trait Sample: Element + bytemuck::Pod + Default + PartialEq {}

macro_rules! impl_sample {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const KIND: ElementKind = ElementKind::$kind;
            }
            impl Sample for $ty {}
        )*
    };
}

impl_sample!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
);

impl Element for String {
    const KIND: ElementKind = ElementKind::Record;
}

/// Number of raw elements per sample for the given element kind and mode.
pub(crate) fn elements_per_sample<T: Element>(complex: bool) -> usize {
    if complex && T::KIND.is_numeric() { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_native_types() {
        assert_eq!(<i8 as Element>::KIND.size(), Some(std::mem::size_of::<i8>()));
        assert_eq!(<u16 as Element>::KIND.size(), Some(std::mem::size_of::<u16>()));
        assert_eq!(<i64 as Element>::KIND.size(), Some(std::mem::size_of::<i64>()));
        assert_eq!(<f32 as Element>::KIND.size(), Some(std::mem::size_of::<f32>()));
        assert_eq!(<String as Element>::KIND.size(), None);
    }

    #[test]
    fn records_never_pair_into_complex_samples() {
        assert_eq!(elements_per_sample::<f32>(true), 2);
        assert_eq!(elements_per_sample::<f32>(false), 1);
        assert_eq!(elements_per_sample::<String>(true), 1);
    }
}
