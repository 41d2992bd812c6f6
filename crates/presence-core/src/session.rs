use std::time::Duration;

use crate::debounce::{PresenceDebouncer, PresenceDecision, DEFAULT_CONFIRM_TICKS};
use crate::detector::RawDetection;
use crate::face_box::{CodecError, FaceBox};
use crate::liveness::{HeadTurnConfig, HeadTurnTracker, HeadTurnVerdict};
use crate::state::{DetectionState, PresenceEvent};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub confirm_ticks: u32,
    pub head_turn: HeadTurnConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            confirm_ticks: DEFAULT_CONFIRM_TICKS,
            head_turn: HeadTurnConfig::default(),
        }
    }
}

/// Per-session working set: debouncer, head-turn history, and the last
/// processed frame timestamp.
///
/// Owned by one detection loop and mutated only through `admit` and
/// `apply`, one tick at a time.
#[derive(Debug, Clone)]
pub struct DetectionSession {
    debouncer: PresenceDebouncer,
    tracker: HeadTurnTracker,
    last_timestamp: Option<Duration>,
}

impl DetectionSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            debouncer: PresenceDebouncer::new(config.confirm_ticks),
            tracker: HeadTurnTracker::new(config.head_turn),
            last_timestamp: None,
        }
    }

    /// Record `timestamp` as processed. Returns false when it does not move
    /// past the last admitted one, in which case the tick must be skipped.
    ///
    /// A source that loops or seeks backwards is therefore not sampled
    /// again until its timestamps pass the last one seen; restart the
    /// session to follow it.
    pub fn admit(&mut self, timestamp: Duration) -> bool {
        if self.last_timestamp.is_some_and(|last| timestamp <= last) {
            return false;
        }
        self.last_timestamp = Some(timestamp);
        true
    }

    /// Fold one detector result into `state`.
    ///
    /// The top-ranked detection is decoded before anything is touched, so a
    /// codec failure leaves both the working set and `state` as they were.
    pub fn apply(
        &mut self,
        detections: &[RawDetection],
        state: &mut DetectionState,
    ) -> Result<Vec<PresenceEvent>, CodecError> {
        let top = detections
            .first()
            .map(FaceBox::from_detection)
            .transpose()?;

        let mut events = Vec::new();
        match (self.debouncer.observe(top.is_some()), top) {
            (PresenceDecision::Confirmed, Some(face)) => {
                if !state.face_detected {
                    events.push(PresenceEvent::FaceConfirmed { face });
                }
                state.face_detected = true;
                state.current_face = Some(face);

                if !state.head_turn_detected {
                    if let HeadTurnVerdict::Turned { range_px } =
                        self.tracker.observe(face.center_x())
                    {
                        state.head_turn_detected = true;
                        events.push(PresenceEvent::HeadTurnConfirmed { range_px });
                    }
                }
            }
            (PresenceDecision::Cleared, _) => {
                if state.face_detected {
                    events.push(PresenceEvent::FaceLost);
                }
                state.face_detected = false;
                state.current_face = None;
            }
            _ => {}
        }
        Ok(events)
    }

    pub fn reset(&mut self) {
        self.debouncer.reset();
        self.tracker.reset();
        self.last_timestamp = None;
    }

    pub fn debouncer(&self) -> &PresenceDebouncer {
        &self.debouncer
    }

    pub fn tracker(&self) -> &HeadTurnTracker {
        &self.tracker
    }

    pub fn last_timestamp(&self) -> Option<Duration> {
        self.last_timestamp
    }
}

impl Default for DetectionSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
