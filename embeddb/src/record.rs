//! Monomorphized key/data representations.
//!
//! Design Notes (§9) offers two ways to carry "raw integer-typed keys/data
//! with runtime widths": byte-granular values plus an injected comparator
//! callback, or monomorphizing on concrete types. This crate takes the
//! second path — `Key` and `DataValue` are compile-time-sized, `Ord`-bound
//! types, so `compareKey`/`compareData` collapse into `Ord::cmp` with zero
//! per-call overhead, at the cost of fixing the key/data width per
//! deployment (a `EmbedDB<K, D, S>` instantiation) rather than at runtime.

use core::fmt::Debug;

/// A fixed-width, strictly-ordered key type.
///
/// Implementors must encode to exactly `SIZE` bytes. Record lookups compare
/// decoded `Self` values through `Ord`, not raw bytes, so the on-disk
/// encoding itself need not be order-preserving.
pub trait Key: Copy + Ord + Debug + Default + 'static {
    /// On-disk width in bytes (spec.md's `keySize`).
    const SIZE: usize;

    /// Encode `self` into `out`, which is exactly `SIZE` bytes long.
    fn write_bytes(&self, out: &mut [u8]);

    /// Decode a value from `bytes`, which is exactly `SIZE` bytes long.
    fn read_bytes(bytes: &[u8]) -> Self;

    /// Widen to `i128` for the spline index's slope arithmetic (component D).
    /// Every supported key type is an integer, so this is lossless.
    fn as_i128(&self) -> i128;
}

/// A fixed-width data value type (spec.md's `dataSize`).
pub trait DataValue: Copy + Ord + Debug + Default + 'static {
    /// On-disk width in bytes.
    const SIZE: usize;

    fn write_bytes(&self, out: &mut [u8]);
    fn read_bytes(bytes: &[u8]) -> Self;
}

macro_rules! impl_key {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Key for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                fn write_bytes(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
                }

                fn read_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_ne_bytes(buf)
                }

                fn as_i128(&self) -> i128 {
                    *self as i128
                }
            }
        )+
    };
}

macro_rules! impl_data_value {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl DataValue for $ty {
                const SIZE: usize = core::mem::size_of::<$ty>();

                fn write_bytes(&self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_ne_bytes());
                }

                fn read_bytes(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; core::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_ne_bytes(buf)
                }
            }
        )+
    };
}

impl_key!(u32, i32, u64, i64);
impl_data_value!(u32, i32, u64, i64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_key_round_trips() {
        let mut buf = [0u8; 4];
        let k: u32 = 97855;
        Key::write_bytes(&k, &mut buf);
        assert_eq!(<u32 as Key>::read_bytes(&buf), k);
    }

    #[test]
    fn i64_data_round_trips() {
        let mut buf = [0u8; 8];
        let d: i64 = -12345;
        DataValue::write_bytes(&d, &mut buf);
        assert_eq!(<i64 as DataValue>::read_bytes(&buf), d);
    }
}
