use super::PoolIndex;

/// Decoded view of a slot's packed state word.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SlotState<I> {
    /// Slot holds a live element at `data_index` in the dense array.
    Occupied { data_index: I },
    /// Slot is on the free list; `next_free` links to the next free slot.
    Free { next_free: Option<I> },
}

/// Per-index slot metadata.
///
/// `packed` holds either the dense data index (tag bit clear) or the next
/// free-list link (tag bit set). A free-list link of `INDEX_MASK` marks the
/// end of the list.
#[derive(Debug, Copy, Clone)]
pub(super) struct Slot<I: PoolIndex> {
    pub generation: I,
    packed: I,
}

impl<I: PoolIndex> Slot<I> {
    #[inline]
    pub fn occupied(generation: I, data_index: I) -> Self {
        debug_assert!(data_index.bit_and(I::TAG_BIT) == I::ZERO);
        Self { generation, packed: data_index }
    }

    #[inline]
    pub fn set_occupied(&mut self, data_index: I) {
        debug_assert!(data_index.bit_and(I::TAG_BIT) == I::ZERO);
        self.packed = data_index;
    }

    #[inline]
    pub fn set_free(&mut self, next_free: Option<I>) {
        let link = next_free.unwrap_or(I::INDEX_MASK);
        self.packed = link.bit_or(I::TAG_BIT);
    }

    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.packed.bit_and(I::TAG_BIT) == I::ZERO
    }

    /// Dense index without checking the tag. Only meaningful for occupied slots.
    #[inline]
    pub fn data_index_unchecked(&self) -> I {
        self.packed.bit_and(I::INDEX_MASK)
    }

    #[inline]
    pub fn state(&self) -> SlotState<I> {
        let payload = self.packed.bit_and(I::INDEX_MASK);
        if self.is_occupied() {
            SlotState::Occupied { data_index: payload }
        } else if payload == I::INDEX_MASK {
            SlotState::Free { next_free: None }
        } else {
            SlotState::Free { next_free: Some(payload) }
        }
    }
}
