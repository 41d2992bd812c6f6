//! Presence and head-turn liveness detection engine.
//!
//! [`PresenceEngine`] owns one face detector and samples a [`VideoSource`]
//! on a fixed period, publishing a debounced "face present" signal and a
//! one-shot "head turned" latch through a `watch` channel.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use presence_engine::{EngineConfig, PresenceEngine, VideoSource};
//! # async fn run(loader: impl presence_engine::DetectorLoader, camera: Arc<dyn VideoSource>) {
//! let engine = PresenceEngine::new(EngineConfig::from_env(), loader);
//! engine.load_models().await;
//! if engine.start_detection(camera).is_ok() {
//!     let mut state = engine.subscribe();
//!     let _ = state.wait_for(|s| s.face_detected && s.head_turn_detected).await;
//! }
//! engine.shutdown();
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod model;
pub mod video;

pub use config::{ConfigError, EngineConfig};
pub use engine::{EngineError, PresenceEngine};
pub use model::{AssetLoader, DetectorBackend, DetectorLoader, LoadError, ModelHandle};
pub use video::VideoSource;

pub use presence_core::{DetectionState, FaceBox, PresenceEvent};
