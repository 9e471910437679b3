use std::cell::Cell;
use std::rc::Rc;

use tokio::time::Instant;

/// Monotonic millisecond tick source.  Wraps around at 2^32 just like the board's counter, so
/// never compare two readings directly, go through [`Deadline`] instead.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

pub type SharedClock = Rc<dyn Clock>;

/// Absolute point in time at or after which a timed action is considered complete.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Deadline(u32);

impl Deadline {
    pub fn at(timestamp_ms: u32) -> Self {
        Self(timestamp_ms)
    }

    pub fn after(now_ms: u32, duration_ms: u32) -> Self {
        Self(now_ms.wrapping_add(duration_ms))
    }

    pub fn timestamp_ms(&self) -> u32 {
        self.0
    }

    /// Signed-difference comparison, correct across a wrap of the counter as long as the
    /// deadline is less than ~24.8 days away.
    pub fn reached(&self, now_ms: u32) -> bool {
        (now_ms.wrapping_sub(self.0) as i32) >= 0
    }
}

/// Wall clock backed by tokio's [`Instant`] so that paused-time tests advance it too.
pub struct TokioClock {
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u32 {
        // Truncation is the wraparound.
        self.start.elapsed().as_millis() as u32
    }
}

/// Clock that only moves when told to.  Cloning shares the same counter.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    now_ms: Rc<Cell<u32>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn starting_at(now_ms: u32) -> Self {
        Self { now_ms: Rc::new(Cell::new(now_ms)) }
    }

    pub fn advance_ms(&self, delta_ms: u32) {
        self.now_ms.set(self.now_ms.get().wrapping_add(delta_ms));
    }

    pub fn set_ms(&self, now_ms: u32) {
        self.now_ms.set(now_ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.now_ms.get()
    }
}
