//! Presence and liveness primitives for camera check-in.
//!
//! Everything here is synchronous and free of I/O: the detection loop in
//! `presence-engine` owns a [`DetectionSession`] and feeds it one detector
//! result per tick.

pub mod debounce;
pub mod detector;
pub mod face_box;
pub mod frame;
pub mod liveness;
pub mod session;
pub mod state;

pub use debounce::{PresenceDebouncer, PresenceDecision};
pub use detector::{
    BoundingBox, Category, DetectorError, DetectorOptions, FaceDetector, RawDetection, RunningMode,
};
pub use face_box::{CodecError, FaceBox};
pub use frame::Frame;
pub use liveness::{HeadTurnConfig, HeadTurnTracker, HeadTurnVerdict};
pub use session::{DetectionSession, SessionConfig};
pub use state::{DetectionState, PresenceEvent};
