//! `presence replay`: drive the real engine from a recorded detection trace.
//!
//! A trace is the detector output captured from a session, one entry per
//! frame:
//!
//! ```json
//! { "width": 640, "height": 480,
//!   "frames": [ { "timestamp_ms": 0, "detections": [
//!       { "boundingBox": { "originX": 270, "originY": 150, "width": 100, "height": 120 },
//!         "categories": [ { "score": 0.94 } ] } ] } ] }
//! ```
//!
//! The video side hands out one trace frame per engine tick; the detector
//! side answers with whatever was recorded for that timestamp.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use presence_core::{
    DetectionState, DetectorError, DetectorOptions, FaceDetector, Frame, PresenceEvent,
    RawDetection,
};
use presence_engine::{EngineConfig, LoadError, PresenceEngine, VideoSource};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Clone, Deserialize)]
pub struct Trace {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    pub frames: Vec<TraceFrame>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TraceFrame {
    pub timestamp_ms: u64,
    #[serde(default)]
    pub detections: Vec<RawDetection>,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

impl Trace {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read trace {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid trace {}", path.display()))
    }

    fn detections_at(&self, timestamp: Duration) -> Option<&[RawDetection]> {
        self.frames
            .iter()
            .find(|f| Duration::from_millis(f.timestamp_ms) == timestamp)
            .map(|f| f.detections.as_slice())
    }
}

/// Video source that advances one trace frame per read and reports ended
/// once a read goes past the last frame.
struct TraceVideo {
    trace: Arc<Trace>,
    pixels: Arc<[u8]>,
    cursor: AtomicUsize,
    ended: AtomicBool,
}

impl TraceVideo {
    fn new(trace: Arc<Trace>) -> Self {
        let len = trace.width as usize * trace.height as usize * 3;
        Self {
            pixels: vec![0u8; len].into(),
            trace,
            cursor: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
        }
    }
}

impl VideoSource for TraceVideo {
    fn is_paused(&self) -> bool {
        false
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn current_frame(&self) -> Option<Frame> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        let Some(entry) = self.trace.frames.get(i) else {
            self.ended.store(true, Ordering::SeqCst);
            return None;
        };
        Some(Frame::new(
            Arc::clone(&self.pixels),
            self.trace.width,
            self.trace.height,
            3,
            Duration::from_millis(entry.timestamp_ms),
        ))
    }
}

struct ReplayDetector {
    trace: Arc<Trace>,
}

impl FaceDetector for ReplayDetector {
    fn detect_for_video(
        &mut self,
        _frame: &Frame,
        timestamp: Duration,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        self.trace
            .detections_at(timestamp)
            .map(<[RawDetection]>::to_vec)
            .ok_or_else(|| DetectorError::InvalidFrame(format!("no trace entry at {timestamp:?}")))
    }
}

pub struct ReplayOutcome {
    pub events: Vec<PresenceEvent>,
    pub state: DetectionState,
    pub interrupted: bool,
}

/// Run `trace` through a fresh engine, calling `on_event` for every
/// transition as it happens.
pub async fn replay(
    trace: Trace,
    config: EngineConfig,
    mut on_event: impl FnMut(&PresenceEvent) -> Result<()>,
) -> Result<ReplayOutcome> {
    let trace = Arc::new(trace);
    let period = config.tick_interval();

    let loader_trace = Arc::clone(&trace);
    let engine = PresenceEngine::new(
        config,
        move |_: &DetectorOptions| -> Result<Box<dyn FaceDetector>, LoadError> {
            Ok(Box::new(ReplayDetector {
                trace: Arc::clone(&loader_trace),
            }))
        },
    );

    engine.load_models().await;
    let mut events = engine.events();
    let video = Arc::new(TraceVideo::new(Arc::clone(&trace)));
    engine.start_detection(video.clone())?;
    tracing::info!(frames = trace.frames.len(), "replaying trace");

    let mut seen = Vec::new();
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    on_event(&event)?;
                    seen.push(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::time::sleep(period) => {
                if video.is_ended() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("interrupted");
                interrupted = true;
                break;
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        on_event(&event)?;
        seen.push(event);
    }

    engine.stop_detection();
    let state = engine.state();
    engine.shutdown();

    Ok(ReplayOutcome {
        events: seen,
        state,
        interrupted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace_json(centers: &[Option<f64>]) -> String {
        let frames: Vec<serde_json::Value> = centers
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let detections = match c {
                    Some(cx) => serde_json::json!([{
                        "boundingBox": {"originX": cx - 50.0, "originY": 100.0, "width": 100.0, "height": 120.0},
                        "categories": [{"score": 0.94}]
                    }]),
                    None => serde_json::json!([]),
                };
                serde_json::json!({"timestamp_ms": i as u64 * 33, "detections": detections})
            })
            .collect();
        serde_json::json!({"width": 8, "height": 8, "frames": frames}).to_string()
    }

    fn fast() -> EngineConfig {
        EngineConfig {
            tick_interval_ms: 2,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_trace_defaults_frame_size() {
        let trace: Trace = serde_json::from_str(r#"{"frames": []}"#).unwrap();
        assert_eq!((trace.width, trace.height), (640, 480));
    }

    #[test]
    fn test_video_advances_then_ends() {
        let trace: Trace = serde_json::from_str(&trace_json(&[Some(100.0), None])).unwrap();
        let video = TraceVideo::new(Arc::new(trace));
        assert_eq!(video.current_frame().unwrap().timestamp(), Duration::ZERO);
        assert_eq!(
            video.current_frame().unwrap().timestamp(),
            Duration::from_millis(33)
        );
        assert!(!video.is_ended());
        assert!(video.current_frame().is_none());
        assert!(video.is_ended());
    }

    #[test]
    fn test_detector_answers_by_timestamp() {
        let trace: Trace = serde_json::from_str(&trace_json(&[Some(100.0), None])).unwrap();
        let mut detector = ReplayDetector {
            trace: Arc::new(trace),
        };
        let frame = Frame::new(vec![0u8; 3].into(), 1, 1, 3, Duration::ZERO);
        assert_eq!(
            detector
                .detect_for_video(&frame, Duration::ZERO)
                .unwrap()
                .len(),
            1
        );
        assert!(detector
            .detect_for_video(&frame, Duration::from_millis(33))
            .unwrap()
            .is_empty());
        assert!(matches!(
            detector.detect_for_video(&frame, Duration::from_millis(5)),
            Err(DetectorError::InvalidFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_head_turn_session() {
        let mut centers: Vec<Option<f64>> = vec![Some(300.0); 2];
        centers.extend((0..12).map(|i| Some(300.0 + 6.0 * i as f64)));
        let trace: Trace = serde_json::from_str(&trace_json(&centers)).unwrap();

        let mut printed = 0;
        let outcome = replay(trace, fast(), |_| {
            printed += 1;
            Ok(())
        })
        .await
        .unwrap();

        assert!(!outcome.interrupted);
        assert!(outcome.state.is_verified());
        assert_eq!(printed, outcome.events.len());
        assert!(matches!(
            outcome.events[0],
            PresenceEvent::FaceConfirmed { .. }
        ));
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, PresenceEvent::HeadTurnConfirmed { .. })));
    }

    #[tokio::test]
    async fn test_replay_photo_is_not_live() {
        let trace: Trace = serde_json::from_str(&trace_json(&[Some(300.0); 25])).unwrap();
        let outcome = replay(trace, fast(), |_| Ok(())).await.unwrap();
        assert!(outcome.state.face_detected);
        assert!(!outcome.state.head_turn_detected);
        assert!(!outcome.state.is_verified());
    }

    #[tokio::test]
    async fn test_replay_flicker_never_confirms() {
        let centers: Vec<Option<f64>> = (0..20)
            .map(|i| if i % 2 == 0 { Some(300.0) } else { None })
            .collect();
        let trace: Trace = serde_json::from_str(&trace_json(&centers)).unwrap();
        let outcome = replay(trace, fast(), |_| Ok(())).await.unwrap();
        assert!(outcome.events.is_empty());
        assert!(!outcome.state.face_detected);
    }
}
