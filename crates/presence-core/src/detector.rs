use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Frame;

/// Default minimum score for the detector to report a candidate.
pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("frame rejected by detector: {0}")]
    InvalidFrame(String),
    #[error("detector has been released")]
    Released,
}

/// Bounding box in absolute pixel units, as reported by the detector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_name: Option<String>,
}

/// One candidate face as returned by the detector, before normalization.
///
/// `categories` is ordered by the detector's own ranking; only the first
/// score is used downstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDetection {
    pub bounding_box: BoundingBox,
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// How the detector is asked to treat consecutive inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningMode {
    /// Independent still images.
    Image,
    /// Sequential frames sharing temporal context.
    Video,
}

/// Construction options passed to a detector backend at load time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorOptions {
    pub min_detection_confidence: f32,
    pub running_mode: RunningMode,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            running_mode: RunningMode::Video,
        }
    }
}

/// Black-box face detection capability consumed once per tick.
///
/// Implementations may keep temporal state between frames, hence
/// `&mut self`. Timestamps passed to `detect_for_video` are monotonic for a
/// given stream and never repeat.
pub trait FaceDetector: Send {
    fn detect_for_video(
        &mut self,
        frame: &Frame,
        timestamp: Duration,
    ) -> Result<Vec<RawDetection>, DetectorError>;

    /// Free the underlying runtime resources. Called exactly once.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_use_video_mode() {
        let options = DetectorOptions::default();
        assert_eq!(options.running_mode, RunningMode::Video);
        assert!((options.min_detection_confidence - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_raw_detection_parses_detector_json() {
        let json = r#"{
            "boundingBox": {"originX": 12.6, "originY": 8.2, "width": 50.4, "height": 60.9},
            "categories": [{"score": 0.873, "categoryName": "face"}]
        }"#;
        let det: RawDetection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bounding_box.origin_x, 12.6);
        assert_eq!(det.categories.len(), 1);
        assert_eq!(det.categories[0].category_name.as_deref(), Some("face"));
    }

    #[test]
    fn test_missing_categories_defaults_to_empty() {
        let json = r#"{"boundingBox": {"originX": 0, "originY": 0, "width": 1, "height": 1}}"#;
        let det: RawDetection = serde_json::from_str(json).unwrap();
        assert!(det.categories.is_empty());
    }
}
