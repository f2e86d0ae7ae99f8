//! Generational slot pools.
//!
//! A pool stores its elements in a dense array and hands out [`Handle`]s that
//! stay valid across unrelated inserts and erases. Every slot carries a
//! generation counter, so a handle to an erased element is detected instead of
//! silently aliasing whatever reused the slot.
//!
//! Layout:
//! - `slots`: stable, indexed by `Handle::index`
//! - `data`: dense, reordered by swap-erase
//! - `indices`: dense index -> slot index back-map

mod error;
mod handle;
mod index;
mod slot;
mod slot_pool;

pub use error::PoolError;
pub use handle::Handle;
pub use index::PoolIndex;
pub use slot::SlotState;
pub use slot_pool::{Iter, IterMut, Pool};
