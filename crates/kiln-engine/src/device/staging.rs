/// Where an upload's bytes go inside the staging space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StagingSlot {
    /// Payload exceeds the ring; use a one-off transfer buffer of exactly its size.
    Temporary,
    /// Write at `offset` in the ring buffer; `cycle` asks the backend for a
    /// fresh allocation first.
    Ring { offset: u32, cycle: bool },
}

/// Outcome of a reservation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reserve {
    Ready(StagingSlot),
    /// The cycle budget is spent. The caller must flush, wait for the GPU and
    /// reset the ring before reserving again.
    Stall,
}

/// Offset/cycle bookkeeping for one fixed-size staging buffer.
///
/// Uploads are appended until the buffer is full. A full buffer is cycled
/// (new backing allocation, offset back to zero) at most `max_cycles` times
/// between resets; after that the caller has to stall.
#[derive(Debug, Clone)]
pub struct StagingRing {
    capacity: u32,
    max_cycles: u32,
    offset: u32,
    cycles: u32,
}

impl StagingRing {
    pub fn new(capacity: u32, max_cycles: u32) -> Self {
        Self {
            capacity,
            max_cycles,
            offset: 0,
            cycles: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    #[inline]
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    /// Reserves `size` bytes with the start aligned to `alignment`.
    pub fn reserve(&mut self, size: u32, alignment: u32) -> Reserve {
        if size > self.capacity {
            return Reserve::Ready(StagingSlot::Temporary);
        }

        let aligned = align_up(self.offset, alignment);

        if aligned as u64 + size as u64 > self.capacity as u64 {
            if self.cycles >= self.max_cycles {
                return Reserve::Stall;
            }
            self.cycles += 1;
            self.offset = size;
            return Reserve::Ready(StagingSlot::Ring { offset: 0, cycle: true });
        }

        self.offset = aligned + size;
        Reserve::Ready(StagingSlot::Ring {
            offset: aligned,
            cycle: aligned == 0,
        })
    }

    /// Called once the commands reading this ring have been submitted.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.cycles = 0;
    }
}

#[inline]
pub fn align_up(value: u32, alignment: u32) -> u32 {
    let alignment = alignment.max(1);
    value.div_ceil(alignment) * alignment
}
