/// Consecutive present ticks required before a face is declared present.
pub const DEFAULT_CONFIRM_TICKS: u32 = 3;

/// What a single observation did to the presence signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresenceDecision {
    /// Present tick with the counter at or above the threshold.
    Confirmed,
    /// Absent tick that drained the counter to zero.
    Cleared,
    /// Neither threshold crossed; the previous signal stands.
    Unchanged,
}

/// Hysteresis filter over per-tick detector outcomes.
///
/// Present ticks increment a saturating counter, absent ticks decrement it
/// with a floor of zero. Presence is (re)confirmed once the counter reaches
/// the threshold and cleared only when it drains back to exactly zero.
#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
    threshold: u32,
    counter: u32,
}

impl PresenceDebouncer {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            counter: 0,
        }
    }

    pub fn observe(&mut self, present: bool) -> PresenceDecision {
        if present {
            self.counter = self.counter.saturating_add(1);
            if self.counter >= self.threshold {
                return PresenceDecision::Confirmed;
            }
        } else {
            self.counter = self.counter.saturating_sub(1);
            if self.counter == 0 {
                return PresenceDecision::Cleared;
            }
        }
        PresenceDecision::Unchanged
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}

impl Default for PresenceDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_TICKS)
    }
}
