use std::fmt::Debug;
use std::hash::Hash;

/// Unsigned integer usable as a pool index and generation counter.
///
/// The top bit of the type is reserved as the free/occupied tag of a slot's
/// packed state word, so the usable index range is `0..INDEX_MASK`.
/// `INDEX_MASK` itself terminates the free list.
pub trait PoolIndex: Copy + Eq + Ord + Hash + Debug + Default + 'static {
    const ZERO: Self;

    /// Largest value of the type; used as the null handle index.
    const MAX: Self;

    /// Top bit of the type.
    const TAG_BIT: Self;

    /// All bits below the tag bit.
    const INDEX_MASK: Self;

    fn to_usize(self) -> usize;

    /// Truncating conversion; callers guarantee `value` fits.
    fn from_usize(value: usize) -> Self;

    fn to_u64(self) -> u64;

    fn wrapping_inc(self) -> Self;

    fn bit_or(self, other: Self) -> Self;

    fn bit_and(self, other: Self) -> Self;
}

macro_rules! impl_pool_index {
    ($($t:ty),* $(,)?) => {$(
        impl PoolIndex for $t {
            const ZERO: Self = 0;
            const MAX: Self = <$t>::MAX;
            const TAG_BIT: Self = 1 << (<$t>::BITS - 1);
            const INDEX_MASK: Self = !(1 << (<$t>::BITS - 1));

            #[inline]
            fn to_usize(self) -> usize {
                self as usize
            }

            #[inline]
            fn from_usize(value: usize) -> Self {
                value as $t
            }

            #[inline]
            fn to_u64(self) -> u64 {
                self as u64
            }

            #[inline]
            fn wrapping_inc(self) -> Self {
                self.wrapping_add(1)
            }

            #[inline]
            fn bit_or(self, other: Self) -> Self {
                self | other
            }

            #[inline]
            fn bit_and(self, other: Self) -> Self {
                self & other
            }
        }
    )*};
}

impl_pool_index!(u16, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bit_is_top_bit() {
        assert_eq!(<u16 as PoolIndex>::TAG_BIT, 0x8000);
        assert_eq!(<u32 as PoolIndex>::TAG_BIT, 0x8000_0000);
        assert_eq!(<u64 as PoolIndex>::TAG_BIT, 1 << 63);
    }

    #[test]
    fn mask_and_tag_are_disjoint() {
        assert_eq!(<u32 as PoolIndex>::INDEX_MASK & <u32 as PoolIndex>::TAG_BIT, 0);
        assert_eq!(<u32 as PoolIndex>::INDEX_MASK | <u32 as PoolIndex>::TAG_BIT, u32::MAX);
    }
}
