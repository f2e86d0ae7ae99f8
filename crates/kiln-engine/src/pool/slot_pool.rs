use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

use super::slot::Slot;
use super::{Handle, PoolError, PoolIndex, SlotState};

/// Stable-handle container over a dense array.
///
/// `T` is the stored element, `K` the handle marker (defaults to `T`), `I`
/// the index/generation integer.
///
/// Invariants:
/// - `data.len() == indices.len()`
/// - `slots.len() >= data.len()`
/// - for every occupied slot `s`, `indices[s.data_index] == s`
pub struct Pool<T, K = T, I: PoolIndex = u32> {
    slots: Vec<Slot<I>>,
    data: Vec<T>,
    indices: Vec<I>,
    free_head: Option<I>,
    _marker: PhantomData<fn() -> K>,
}

impl<T, K, I: PoolIndex> Pool<T, K, I> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            data: Vec::new(),
            indices: Vec::new(),
            free_head: None,
            _marker: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            data: Vec::with_capacity(capacity),
            indices: Vec::with_capacity(capacity),
            free_head: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Inserts `value` and returns its handle.
    ///
    /// Reuses the most recently freed slot (bumping its generation) before
    /// growing the slot array.
    ///
    /// # Panics
    /// If the slot array would reach the reserved tag-bit range of `I`.
    pub fn insert(&mut self, value: T) -> Handle<K, I> {
        let data_index = I::from_usize(self.data.len());

        let slot_index = match self.free_head {
            Some(free) => {
                let slot = &mut self.slots[free.to_usize()];
                self.free_head = match slot.state() {
                    SlotState::Free { next_free } => next_free,
                    SlotState::Occupied { .. } => unreachable!("free list links an occupied slot"),
                };
                slot.generation = slot.generation.wrapping_inc();
                slot.set_occupied(data_index);
                free
            }
            None => {
                let next = self.slots.len();
                assert!(
                    next < I::INDEX_MASK.to_usize(),
                    "pool index space exhausted: slot {next} collides with the free-list tag bit"
                );
                self.slots.push(Slot::occupied(I::ZERO, data_index));
                I::from_usize(next)
            }
        };

        self.data.push(value);
        self.indices.push(slot_index);

        Handle::new(slot_index, self.slots[slot_index.to_usize()].generation)
    }

    /// Inserts the value built by `f`, which receives the handle the value
    /// will live under.
    pub fn insert_with(&mut self, f: impl FnOnce(Handle<K, I>) -> T) -> Handle<K, I> {
        let next = match self.free_head {
            Some(free) => Handle::new(free, self.slots[free.to_usize()].generation.wrapping_inc()),
            None => Handle::new(I::from_usize(self.slots.len()), I::ZERO),
        };
        let handle = self.insert(f(next));
        debug_assert!(handle == next);
        handle
    }

    /// Removes the element behind `handle` and returns it.
    ///
    /// The last dense element is moved into the vacated position and its slot
    /// is patched to point at the new location.
    pub fn remove(&mut self, handle: Handle<K, I>) -> Option<T> {
        let slot_index = self.live_slot(handle)?;
        let data_index = self.slots[slot_index].data_index_unchecked().to_usize();
        let last = self.data.len() - 1;

        let value = self.data.swap_remove(data_index);
        self.indices.swap_remove(data_index);

        if data_index != last {
            let moved = self.indices[data_index].to_usize();
            self.slots[moved].set_occupied(I::from_usize(data_index));
        }

        self.slots[slot_index].set_free(self.free_head);
        self.free_head = Some(I::from_usize(slot_index));

        Some(value)
    }

    /// Erases the element behind `handle`.
    ///
    /// Returns `false` without side effects for stale, null or foreign handles.
    #[inline]
    pub fn erase(&mut self, handle: Handle<K, I>) -> bool {
        self.remove(handle).is_some()
    }

    #[inline]
    pub fn contains(&self, handle: Handle<K, I>) -> bool {
        self.live_slot(handle).is_some()
    }

    pub fn get(&self, handle: Handle<K, I>) -> Option<&T> {
        let slot = self.live_slot(handle)?;
        let data_index = self.slots[slot].data_index_unchecked().to_usize();
        self.data.get(data_index)
    }

    pub fn get_mut(&mut self, handle: Handle<K, I>) -> Option<&mut T> {
        let slot = self.live_slot(handle)?;
        let data_index = self.slots[slot].data_index_unchecked().to_usize();
        self.data.get_mut(data_index)
    }

    /// Bounds-checked access.
    pub fn at(&self, handle: Handle<K, I>) -> Result<&T, PoolError> {
        self.get(handle).ok_or_else(|| out_of_range(handle))
    }

    /// Bounds-checked mutable access.
    pub fn at_mut(&mut self, handle: Handle<K, I>) -> Result<&mut T, PoolError> {
        match self.live_slot(handle) {
            Some(slot) => {
                let data_index = self.slots[slot].data_index_unchecked().to_usize();
                Ok(&mut self.data[data_index])
            }
            None => Err(out_of_range(handle)),
        }
    }

    /// Decoded state of the slot at `index`, if that slot exists.
    pub fn slot_state(&self, index: I) -> Option<SlotState<I>> {
        self.slots.get(index.to_usize()).map(Slot::state)
    }

    /// Removes every element.
    ///
    /// Slots keep their generations and go back on the free list, so handles
    /// issued before the clear stay detectably stale.
    pub fn clear(&mut self) {
        self.data.clear();
        self.indices.clear();
        self.free_all_slots();
    }

    /// Removes every element, yielding them in dense order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.indices.clear();
        self.free_all_slots();
        self.data.drain(..)
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, T> {
        self.data.iter()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> IterMut<'_, T> {
        self.data.iter_mut()
    }

    fn free_all_slots(&mut self) {
        self.free_head = None;
        for (i, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.set_free(self.free_head);
            self.free_head = Some(I::from_usize(i));
        }
    }

    #[inline]
    fn live_slot(&self, handle: Handle<K, I>) -> Option<usize> {
        let index = handle.index.to_usize();
        let slot = self.slots.get(index)?;
        (slot.generation == handle.generation && slot.is_occupied()).then_some(index)
    }
}

fn out_of_range<K, I: PoolIndex>(handle: Handle<K, I>) -> PoolError {
    PoolError::OutOfRange {
        index: handle.index.to_u64(),
        generation: handle.generation.to_u64(),
    }
}

pub type Iter<'a, T> = std::slice::Iter<'a, T>;
pub type IterMut<'a, T> = std::slice::IterMut<'a, T>;

impl<T, K, I: PoolIndex> Default for Pool<T, K, I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unchecked access for call sites that already proved validity.
///
/// Debug builds assert the handle is live. In release a stale handle reads
/// whatever the slot decodes to, or panics on an out-of-bounds index.
impl<T, K, I: PoolIndex> Index<Handle<K, I>> for Pool<T, K, I> {
    type Output = T;

    fn index(&self, handle: Handle<K, I>) -> &T {
        debug_assert!(self.contains(handle), "stale pool handle {handle:?}");
        let data_index = self.slots[handle.index.to_usize()].data_index_unchecked();
        &self.data[data_index.to_usize()]
    }
}

impl<T, K, I: PoolIndex> IndexMut<Handle<K, I>> for Pool<T, K, I> {
    fn index_mut(&mut self, handle: Handle<K, I>) -> &mut T {
        debug_assert!(self.contains(handle), "stale pool handle {handle:?}");
        let data_index = self.slots[handle.index.to_usize()].data_index_unchecked();
        &mut self.data[data_index.to_usize()]
    }
}

impl<'a, T, K, I: PoolIndex> IntoIterator for &'a Pool<T, K, I> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, T, K, I: PoolIndex> IntoIterator for &'a mut Pool<T, K, I> {
    type Item = &'a mut T;
    type IntoIter = IterMut<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestPool = Pool<u64>;

    /// Small deterministic generator for operation sequences.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn check_invariants<T>(pool: &Pool<T>) {
        assert_eq!(pool.data.len(), pool.indices.len());
        assert!(pool.slots.len() >= pool.data.len());
        for (dense, &slot) in pool.indices.iter().enumerate() {
            let s = pool.slots[slot as usize];
            assert_eq!(s.state(), SlotState::Occupied { data_index: dense as u32 });
        }
        let occupied = pool.slots.iter().filter(|s| s.is_occupied()).count();
        assert_eq!(occupied, pool.len());
    }

    // ── insert / get ──────────────────────────────────────────────────────

    #[test]
    fn insert_returns_distinct_handles() {
        let mut pool = TestPool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        assert_ne!(a, b);
        assert_eq!(pool.get(a), Some(&1));
        assert_eq!(pool.get(b), Some(&2));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn null_handle_is_never_contained() {
        let mut pool = TestPool::new();
        pool.insert(1);
        assert!(!pool.contains(Handle::NULL));
        assert!(pool.get(Handle::NULL).is_none());
    }

    #[test]
    fn insert_with_sees_its_own_handle() {
        let mut pool: Pool<Handle<u64>, u64> = Pool::new();
        let first = pool.insert_with(|h| h);
        assert_eq!(pool[first], first);

        pool.erase(first);
        let reused = pool.insert_with(|h| h);
        assert_eq!(reused.index, first.index);
        assert_ne!(reused.generation, first.generation);
        assert_eq!(pool[reused], reused);
    }

    #[test]
    fn get_mut_writes_through() {
        let mut pool = TestPool::new();
        let h = pool.insert(5);
        *pool.get_mut(h).unwrap() = 6;
        assert_eq!(pool[h], 6);
    }

    // ── erase ─────────────────────────────────────────────────────────────

    #[test]
    fn erase_twice_returns_false() {
        let mut pool = TestPool::new();
        let h = pool.insert(1);
        assert!(pool.erase(h));
        assert!(!pool.erase(h));
        assert!(pool.is_empty());
    }

    #[test]
    fn erase_never_issued_handle_has_no_effect() {
        let mut pool = TestPool::new();
        let h = pool.insert(1);
        assert!(!pool.erase(Handle::new(17, 0)));
        assert!(!pool.erase(Handle::new(h.index, h.generation + 1)));
        assert_eq!(pool.get(h), Some(&1));
        check_invariants(&pool);
    }

    #[test]
    fn erase_patches_moved_element() {
        let mut pool = TestPool::new();
        let a = pool.insert(10);
        let b = pool.insert(20);
        let c = pool.insert(30);

        // `c` is the last dense element and gets swapped into `a`'s place.
        assert_eq!(pool.remove(a), Some(10));
        assert_eq!(pool.get(b), Some(&20));
        assert_eq!(pool.get(c), Some(&30));
        check_invariants(&pool);
    }

    // ── generations ───────────────────────────────────────────────────────

    #[test]
    fn reused_slot_rejects_old_handle() {
        let mut pool = TestPool::new();
        let old = pool.insert(1);
        pool.erase(old);
        let new = pool.insert(2);

        assert_eq!(old.index, new.index);
        assert_ne!(old.generation, new.generation);
        assert!(!pool.contains(old));
        assert!(pool.get(old).is_none());
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn clear_keeps_old_handles_stale() {
        let mut pool = TestPool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        pool.clear();
        assert!(pool.is_empty());
        assert!(!pool.contains(a));
        assert!(!pool.contains(b));

        let c = pool.insert(3);
        assert!(!pool.contains(a));
        assert!(pool.contains(c));
        check_invariants(&pool);
    }

    #[test]
    fn free_list_is_lifo() {
        let mut pool = TestPool::new();
        let a = pool.insert(1);
        let b = pool.insert(2);
        pool.erase(a);
        pool.erase(b);
        assert_eq!(pool.slot_state(b.index), Some(SlotState::Free { next_free: Some(a.index) }));
        assert_eq!(pool.insert(3).index, b.index);
        assert_eq!(pool.insert(4).index, a.index);
    }

    // ── at ────────────────────────────────────────────────────────────────

    #[test]
    fn at_reports_out_of_range() {
        let mut pool = TestPool::new();
        let h = pool.insert(1);
        pool.erase(h);
        assert_eq!(
            pool.at(h),
            Err(PoolError::OutOfRange { index: h.index as u64, generation: h.generation as u64 })
        );
        assert!(pool.at_mut(h).is_err());
    }

    // ── iteration ─────────────────────────────────────────────────────────

    #[test]
    fn iteration_visits_live_elements_once() {
        let mut pool = TestPool::new();
        let handles: Vec<_> = (0..10).map(|v| pool.insert(v)).collect();
        for h in handles.iter().step_by(3) {
            pool.erase(*h);
        }

        let mut seen: Vec<u64> = pool.iter().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 4, 5, 7, 8]);
    }

    #[test]
    fn drain_empties_pool() {
        let mut pool = TestPool::new();
        let h = pool.insert(1);
        pool.insert(2);
        let mut drained: Vec<_> = pool.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
        assert!(pool.is_empty());
        assert!(!pool.contains(h));
    }

    // ── randomized traffic ────────────────────────────────────────────────

    #[test]
    fn handles_stay_valid_under_random_traffic() {
        let mut pool = TestPool::new();
        let mut live: Vec<(Handle<u64>, u64)> = Vec::new();
        let mut dead: Vec<Handle<u64>> = Vec::new();
        let mut rng = Lcg(0x5eed);

        for step in 0..4000u64 {
            if live.is_empty() || rng.next() % 3 != 0 {
                let h = pool.insert(step);
                live.push((h, step));
            } else {
                let i = (rng.next() as usize) % live.len();
                let (h, v) = live.swap_remove(i);
                assert_eq!(pool.remove(h), Some(v));
                dead.push(h);
            }

            if step % 97 == 0 {
                for (h, v) in &live {
                    assert!(pool.contains(*h));
                    assert_eq!(pool.get(*h), Some(v));
                }
                for h in &dead {
                    assert!(!pool.contains(*h));
                }
                check_invariants(&pool);
            }
        }

        let mut expected: Vec<u64> = live.iter().map(|(_, v)| *v).collect();
        let mut actual: Vec<u64> = pool.iter().copied().collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);
    }

    // ── index space ───────────────────────────────────────────────────────

    #[test]
    #[should_panic(expected = "pool index space exhausted")]
    fn narrow_pool_asserts_on_tag_collision() {
        let mut pool: Pool<(), (), u16> = Pool::new();
        for _ in 0..=u16::MAX {
            pool.insert(());
        }
    }

    #[test]
    fn narrow_pool_fills_usable_range() {
        let mut pool: Pool<(), (), u16> = Pool::new();
        let mut last = Handle::NULL;
        for _ in 0..0x7fff {
            last = pool.insert(());
        }
        assert_eq!(last.index, 0x7ffe);
        assert!(pool.contains(last));
    }
}
