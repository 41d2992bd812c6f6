//! Canonical five-field face record derived from a raw detection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::RawDetection;

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("detection carries no category score")]
    MissingScore,
    #[error("detection has a non-finite {0}")]
    NonFinite(&'static str),
}

/// Face bounding box `[x, y, w, h, confidence]` in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    pub w: i32,
    pub h: i32,
    /// Top category score, rounded to two decimals.
    pub confidence: f64,
}

impl FaceBox {
    /// Normalize a detector result. Coordinates are already absolute pixels,
    /// so they are only rounded, never rescaled against the frame size.
    pub fn from_detection(detection: &RawDetection) -> Result<Self, CodecError> {
        let bbox = &detection.bounding_box;
        let score = detection
            .categories
            .first()
            .map(|c| c.score)
            .ok_or(CodecError::MissingScore)?;

        Ok(Self {
            x: round_px(bbox.origin_x, "origin_x")?,
            y: round_px(bbox.origin_y, "origin_y")?,
            w: round_px(bbox.width, "width")?,
            h: round_px(bbox.height, "height")?,
            confidence: round_half_up(score * 100.0, "score")? / 100.0,
        })
    }

    /// Horizontal center, used by the head-turn tracker.
    pub fn center_x(&self) -> f64 {
        f64::from(self.x) + f64::from(self.w) / 2.0
    }
}

impl TryFrom<&RawDetection> for FaceBox {
    type Error = CodecError;

    fn try_from(detection: &RawDetection) -> Result<Self, Self::Error> {
        Self::from_detection(detection)
    }
}

fn round_px(value: f64, field: &'static str) -> Result<i32, CodecError> {
    // `as` saturates at the i32 bounds, which no real frame reaches.
    Ok(round_half_up(value, field)? as i32)
}

/// Halves round toward positive infinity (`-2.5` becomes `-2`).
fn round_half_up(value: f64, field: &'static str) -> Result<f64, CodecError> {
    if !value.is_finite() {
        return Err(CodecError::NonFinite(field));
    }
    Ok((value + 0.5).floor())
}
