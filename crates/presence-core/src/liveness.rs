//! Head-turn liveness via horizontal face-center spread.
//!
//! A photograph held in front of the camera yields a face box whose center
//! barely moves between frames: only detector jitter and hand shake. A live
//! subject asked to turn their head left and right sweeps the box center
//! across tens of pixels within a second or two.
//!
//! The tracker keeps a short FIFO of recent center positions and latches
//! once their spread exceeds a threshold. It adds no inference and looks at
//! one axis only.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and frozen or blank feeds.
//! - **Does not block:** Video replay, a photo swept sideways by hand,
//!   3D masks.

use std::collections::VecDeque;

/// Most recent centers kept for the spread computation.
pub const DEFAULT_WINDOW: usize = 20;

/// Minimum buffered samples before any decision. About one second at 10 Hz,
/// long enough to tell deliberate motion from detector jitter.
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Spread (max - min, pixels) that counts as a head turn. Static subjects
/// jitter by single digits to low teens at webcam distance. Not calibrated:
/// tune per camera geometry.
pub const DEFAULT_MIN_RANGE_PX: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadTurnConfig {
    pub window: usize,
    pub min_samples: usize,
    pub min_range_px: f64,
}

impl Default for HeadTurnConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            min_samples: DEFAULT_MIN_SAMPLES,
            min_range_px: DEFAULT_MIN_RANGE_PX,
        }
    }
}

/// Outcome of feeding one center sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadTurnVerdict {
    /// Fewer than `min_samples` buffered; no determination.
    Insufficient { samples: usize },
    /// Enough samples, spread still at or below the threshold.
    Static { range_px: f64 },
    /// Spread exceeded the threshold on this sample. Returned once.
    Turned { range_px: f64 },
    /// Already latched earlier in the session; sample ignored.
    Latched,
}

#[derive(Debug, Clone)]
pub struct HeadTurnTracker {
    config: HeadTurnConfig,
    history: VecDeque<f64>,
    latched: bool,
}

impl HeadTurnTracker {
    pub fn new(config: HeadTurnConfig) -> Self {
        let window = config.window.max(1);
        Self {
            config: HeadTurnConfig { window, ..config },
            history: VecDeque::with_capacity(window),
            latched: false,
        }
    }

    /// Append a face center and evaluate the spread.
    pub fn observe(&mut self, center_x: f64) -> HeadTurnVerdict {
        if self.latched {
            return HeadTurnVerdict::Latched;
        }

        self.history.push_back(center_x);
        while self.history.len() > self.config.window {
            self.history.pop_front();
        }

        if self.history.len() < self.config.min_samples {
            return HeadTurnVerdict::Insufficient {
                samples: self.history.len(),
            };
        }

        let range_px = self.range();
        if range_px > self.config.min_range_px {
            self.latched = true;
            HeadTurnVerdict::Turned { range_px }
        } else {
            HeadTurnVerdict::Static { range_px }
        }
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Buffered centers, oldest first.
    pub fn history(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.history.iter().copied()
    }

    pub fn config(&self) -> &HeadTurnConfig {
        &self.config
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.latched = false;
    }

    fn range(&self) -> f64 {
        let (min, max) = self
            .history
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &c| {
                (lo.min(c), hi.max(c))
            });
        max - min
    }
}

impl Default for HeadTurnTracker {
    fn default() -> Self {
        Self::new(HeadTurnConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut HeadTurnTracker, centers: &[f64]) -> Vec<HeadTurnVerdict> {
        centers.iter().map(|&c| tracker.observe(c)).collect()
    }

    #[test]
    fn test_jitter_does_not_latch() {
        let mut t = HeadTurnTracker::default();
        let verdicts = feed(
            &mut t,
            &[100.0, 101.0, 99.0, 100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 101.0],
        );
        assert_eq!(verdicts[9], HeadTurnVerdict::Static { range_px: 4.0 });
        assert!(!t.is_latched());
    }

    #[test]
    fn test_ramp_latches_on_tenth_sample() {
        let mut t = HeadTurnTracker::default();
        let verdicts = feed(
            &mut t,
            &[100.0, 105.0, 112.0, 120.0, 128.0, 135.0, 141.0, 145.0, 148.0, 150.0],
        );
        for v in &verdicts[..9] {
            assert!(matches!(v, HeadTurnVerdict::Insufficient { .. }));
        }
        assert_eq!(verdicts[9], HeadTurnVerdict::Turned { range_px: 50.0 });
        assert!(t.is_latched());
    }

    #[test]
    fn test_nine_samples_make_no_determination() {
        let mut t = HeadTurnTracker::default();
        let verdicts = feed(
            &mut t,
            &[100.0, 200.0, 100.0, 200.0, 100.0, 200.0, 100.0, 200.0, 100.0],
        );
        assert_eq!(verdicts[8], HeadTurnVerdict::Insufficient { samples: 9 });
        assert!(!t.is_latched());
    }

    #[test]
    fn test_range_equal_to_threshold_is_not_a_turn() {
        let mut t = HeadTurnTracker::default();
        let mut centers = vec![100.0; 9];
        centers.push(140.0);
        let verdicts = feed(&mut t, &centers);
        assert_eq!(verdicts[9], HeadTurnVerdict::Static { range_px: 40.0 });
    }

    #[test]
    fn test_history_is_bounded_fifo() {
        let mut t = HeadTurnTracker::new(HeadTurnConfig {
            min_range_px: f64::MAX,
            ..HeadTurnConfig::default()
        });
        for i in 0..35 {
            t.observe(i as f64);
            assert!(t.history().len() <= DEFAULT_WINDOW);
        }
        let kept: Vec<f64> = t.history().collect();
        let expected: Vec<f64> = (15..35).map(|i| i as f64).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_old_motion_ages_out_of_window() {
        let mut t = HeadTurnTracker::new(HeadTurnConfig {
            window: 10,
            min_samples: 10,
            min_range_px: 40.0,
        });
        // The outlier arrives first and is dropped before the window fills.
        t.observe(0.0);
        let verdicts = feed(&mut t, &[100.0; 10]);
        assert_eq!(verdicts[9], HeadTurnVerdict::Static { range_px: 0.0 });
    }

    #[test]
    fn test_latch_is_monotone() {
        let mut t = HeadTurnTracker::default();
        feed(
            &mut t,
            &[100.0, 105.0, 112.0, 120.0, 128.0, 135.0, 141.0, 145.0, 148.0, 150.0],
        );
        let len = t.history().len();
        for _ in 0..30 {
            assert_eq!(t.observe(150.0), HeadTurnVerdict::Latched);
            assert!(t.is_latched());
        }
        assert_eq!(t.history().len(), len);
    }

    #[test]
    fn test_reset_clears_latch_and_history() {
        let mut t = HeadTurnTracker::default();
        feed(&mut t, &[0.0, 100.0, 0.0, 100.0, 0.0, 100.0, 0.0, 100.0, 0.0, 100.0]);
        assert!(t.is_latched());
        t.reset();
        assert!(!t.is_latched());
        assert_eq!(t.history().len(), 0);
    }

    #[test]
    fn test_custom_threshold() {
        let mut t = HeadTurnTracker::new(HeadTurnConfig {
            min_range_px: 3.0,
            ..HeadTurnConfig::default()
        });
        let verdicts = feed(
            &mut t,
            &[100.0, 101.0, 99.0, 100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 101.0],
        );
        assert_eq!(verdicts[9], HeadTurnVerdict::Turned { range_px: 4.0 });
    }
}
