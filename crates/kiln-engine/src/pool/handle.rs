use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use super::PoolIndex;

/// Generation-checked identity of a pool element.
///
/// `K` is a marker for the kind of resource the handle names, so handles
/// for different pools do not mix. A handle is meaningful only for the pool
/// that issued it.
///
/// The null handle is `{ index: I::MAX, generation: 0 }`. No pool ever issues
/// it, because `I::MAX` lies outside the usable index range.
pub struct Handle<K, I: PoolIndex = u32> {
    pub index: I,
    pub generation: I,
    _marker: PhantomData<fn() -> K>,
}

impl<K, I: PoolIndex> Handle<K, I> {
    pub const NULL: Self = Self {
        index: I::MAX,
        generation: I::ZERO,
        _marker: PhantomData,
    };

    #[inline]
    pub const fn new(index: I, generation: I) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl<K, I: PoolIndex> Default for Handle<K, I> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<K, I: PoolIndex> Clone for Handle<K, I> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, I: PoolIndex> Copy for Handle<K, I> {}

impl<K, I: PoolIndex> PartialEq for Handle<K, I> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<K, I: PoolIndex> Eq for Handle<K, I> {}

impl<K, I: PoolIndex> Hash for Handle<K, I> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<K, I: PoolIndex> fmt::Debug for Handle<K, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Handle(null)")
        } else {
            write!(f, "Handle[slot: {:?}, gen: {:?}]", self.index, self.generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker;

    #[test]
    fn default_is_null() {
        let h: Handle<Marker> = Handle::default();
        assert!(h.is_null());
        assert_eq!(h.index, u32::MAX);
        assert_eq!(h.generation, 0);
    }

    #[test]
    fn equality_needs_both_fields() {
        let a: Handle<Marker> = Handle::new(3, 1);
        assert_eq!(a, Handle::new(3, 1));
        assert_ne!(a, Handle::new(3, 2));
        assert_ne!(a, Handle::new(4, 1));
    }

    #[test]
    fn narrow_index_null() {
        let h: Handle<Marker, u16> = Handle::NULL;
        assert_eq!(h.index, u16::MAX);
        assert!(!Handle::<Marker, u16>::new(0, 0).is_null());
    }
}
