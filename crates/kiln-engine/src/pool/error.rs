use thiserror::Error;

/// Bounds-checked pool access failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Error)]
pub enum PoolError {
    /// The handle does not refer to a live element of the pool.
    #[error("handle [slot: {index}, gen: {generation}] does not refer to a live pool element")]
    OutOfRange { index: u64, generation: u64 },
}
