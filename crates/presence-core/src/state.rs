use serde::Serialize;

use crate::face_box::FaceBox;

/// Observable engine state, published to consumers after every change.
///
/// `current_face` is only ever `Some` while `face_detected` is true.
/// `head_turn_detected` never reverts within a session; only a reset or a
/// new start clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionState {
    pub is_model_loaded: bool,
    pub is_detecting: bool,
    pub face_detected: bool,
    pub head_turn_detected: bool,
    pub current_face: Option<FaceBox>,
    pub error: Option<String>,
}

impl DetectionState {
    /// Clear everything a detection session derives, leaving model and
    /// error status alone.
    pub fn clear_detection(&mut self) {
        self.face_detected = false;
        self.head_turn_detected = false;
        self.current_face = None;
    }

    /// Both signals a check-in needs: a face in frame that has turned.
    pub fn is_verified(&self) -> bool {
        self.face_detected && self.head_turn_detected
    }
}

/// Transitions worth reporting to an observability sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// Presence went from absent to confirmed.
    FaceConfirmed { face: FaceBox },
    /// Presence drained back to absent.
    FaceLost,
    /// Liveness latched for this session.
    HeadTurnConfirmed { range_px: f64 },
}
