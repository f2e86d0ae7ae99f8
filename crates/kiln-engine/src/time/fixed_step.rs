/// Fixed-rate update accumulator.
///
/// Each frame's `dt` is added to a remainder; every whole `step` in it is one
/// fixed update. At most `max_steps` run per frame, and the backlog beyond
/// that is dropped so a slow frame cannot snowball.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedStep {
    step: f32,
    max_steps: u32,
    accumulator: f32,
}

impl FixedStep {
    pub const DEFAULT_MAX_STEPS: u32 = 8;

    /// `rate` updates per second.
    pub fn new(rate: f32) -> Self {
        assert!(rate > 0.0, "fixed update rate must be positive, got {rate}");
        Self {
            step: 1.0 / rate,
            max_steps: Self::DEFAULT_MAX_STEPS,
            accumulator: 0.0,
        }
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Seconds per fixed update.
    #[inline]
    pub fn step(&self) -> f32 {
        self.step
    }

    /// Adds `dt` seconds and returns how many fixed updates are due.
    pub fn advance(&mut self, dt: f32) -> u32 {
        self.accumulator += dt.max(0.0);

        let due = (self.accumulator / self.step).floor();
        let steps = (due as u32).min(self.max_steps);
        self.accumulator -= steps as f32 * self.step;

        if steps == self.max_steps && self.accumulator >= self.step {
            log::debug!("fixed step fell behind; dropping {:.3}s", self.accumulator);
            self.accumulator %= self.step;
        }
        steps
    }

    /// Fraction of a step left over, for interpolating between updates.
    #[inline]
    pub fn alpha(&self) -> f32 {
        self.accumulator / self.step
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

impl Default for FixedStep {
    fn default() -> Self {
        Self::new(60.0)
    }
}
