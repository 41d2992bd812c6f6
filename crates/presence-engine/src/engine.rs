use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use presence_core::{DetectionSession, DetectionState, PresenceEvent};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::model::{lock, DetectorLoader, LoadError, ModelHandle};
use crate::video::VideoSource;

/// Transition events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 64;

/// Failures surfaced to the consumer. The `Display` text is what lands in
/// `DetectionState::error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to load the face detection model ({0}); reload and try again")]
    LoadFailed(String),
    #[error("face detection model is not ready yet; wait for loading to finish")]
    ModelNotReady,
    #[error("detection cannot start outside a Tokio runtime")]
    NoRuntime,
}

struct Shared {
    config: EngineConfig,
    loader: Arc<dyn DetectorLoader>,
    state: watch::Sender<DetectionState>,
    events: broadcast::Sender<PresenceEvent>,
    inner: Mutex<Inner>,
}

/// Everything the loop and the control methods mutate. Observable state is
/// only written while this lock is held.
struct Inner {
    model: ModelHandle,
    session: DetectionSession,
    /// Bumped on every start, stop, reset and shutdown. A tick whose
    /// generation no longer matches discards its result.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Inner {
    /// Invalidate the running loop, if any. Returns whether one was running.
    fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Presence and head-turn detection engine.
///
/// Cheap to clone; all clones drive the same detector and state. The
/// detector is released by [`PresenceEngine::shutdown`] or when the last
/// clone is dropped.
#[derive(Clone)]
pub struct PresenceEngine {
    shared: Arc<Shared>,
}

impl PresenceEngine {
    pub fn new<L: DetectorLoader>(config: EngineConfig, loader: L) -> Self {
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "engine configured so detection can never confirm");
        }
        let (state, _) = watch::channel(DetectionState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let session = DetectionSession::new(config.session_config());
        Self {
            shared: Arc::new(Shared {
                config,
                loader: Arc::new(loader),
                state,
                events,
                inner: Mutex::new(Inner {
                    model: ModelHandle::default(),
                    session,
                    generation: 0,
                    task: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> DetectionState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<DetectionState> {
        self.shared.state.subscribe()
    }

    /// Presence transitions as they happen.
    pub fn events(&self) -> broadcast::Receiver<PresenceEvent> {
        self.shared.events.subscribe()
    }

    /// Acquire the detector. Failure is recorded in `state().error` and never
    /// returned; call again to retry. A successful reload releases the
    /// previous detector.
    pub async fn load_models(&self) {
        {
            let _inner = self.lock();
            self.shared.state.send_if_modified(|s| s.error.take().is_some());
        }

        let loader = Arc::clone(&self.shared.loader);
        let options = self.shared.config.detector_options();
        tracing::info!(
            min_confidence = options.min_detection_confidence,
            mode = ?options.running_mode,
            "loading face detection model"
        );

        let loaded = tokio::task::spawn_blocking(move || loader.load(&options))
            .await
            .unwrap_or_else(|e| Err(LoadError::Join(e.to_string())));

        match loaded {
            Ok(detector) => {
                let previous = {
                    let mut inner = self.lock();
                    let previous = std::mem::replace(&mut inner.model, ModelHandle::new(detector));
                    self.shared.state.send_modify(|s| {
                        s.is_model_loaded = true;
                        s.error = None;
                    });
                    previous
                };
                if previous.is_loaded() {
                    tracing::info!("replacing previously loaded detector");
                    // Releasing waits for any inference still running on it.
                    if let Err(e) = tokio::task::spawn_blocking(move || drop(previous)).await {
                        tracing::warn!(error = %e, "releasing previous detector failed");
                    }
                }
                tracing::info!("face detection model loaded");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load face detection model");
                let message = EngineError::LoadFailed(e.to_string()).to_string();
                let _inner = self.lock();
                self.shared.state.send_modify(|s| {
                    s.is_model_loaded = false;
                    s.error = Some(message);
                });
            }
        }
    }

    /// Begin sampling `source` on a fixed period.
    ///
    /// Requires a loaded model; otherwise the error is recorded in state and
    /// returned, and nothing is scheduled. The same applies when called
    /// outside a Tokio runtime. A loop that is already running is replaced.
    pub fn start_detection(&self, source: Arc<dyn VideoSource>) -> Result<(), EngineError> {
        let mut inner = self.lock();

        let loaded = self.shared.state.borrow().is_model_loaded;
        if !loaded || !inner.model.is_loaded() {
            tracing::warn!("detection start requested before the model was loaded");
            return Err(self.refuse_start(EngineError::ModelNotReady));
        }
        let Ok(runtime) = Handle::try_current() else {
            tracing::warn!("detection start requested outside a Tokio runtime");
            return Err(self.refuse_start(EngineError::NoRuntime));
        };

        if inner.cancel() {
            tracing::debug!("replacing running detection loop");
        }
        inner.session.reset();
        self.shared.state.send_modify(|s| {
            s.clear_detection();
            s.is_detecting = true;
        });

        let session_id = Uuid::new_v4();
        let period = self.shared.config.tick_interval();
        let generation = inner.generation;
        let span = tracing::info_span!("detection", session = %session_id);
        inner.task = Some(runtime.spawn(
            run_loop(Arc::downgrade(&self.shared), source, generation, period).instrument(span),
        ));

        tracing::info!(
            session = %session_id,
            period_ms = period.as_millis() as u64,
            "detection started"
        );
        Ok(())
    }

    /// Halt sampling. Detection results are kept. Safe to call repeatedly.
    pub fn stop_detection(&self) {
        let mut inner = self.lock();
        let was_running = inner.cancel();
        self.shared
            .state
            .send_if_modified(|s| std::mem::replace(&mut s.is_detecting, false));
        if was_running {
            tracing::info!("detection stopped");
        }
    }

    /// Stop and clear all detection results and working state, back to the
    /// post-load, pre-start condition.
    pub fn reset_detection(&self) {
        let mut inner = self.lock();
        inner.cancel();
        inner.session.reset();
        self.shared.state.send_if_modified(|s| {
            let before = s.clone();
            s.is_detecting = false;
            s.clear_detection();
            *s != before
        });
        tracing::debug!("detection reset");
    }

    /// Stop the loop, then release the detector. Idempotent.
    ///
    /// Blocks until an in-flight inference call, if any, returns.
    pub fn shutdown(&self) {
        let mut previous = {
            let mut inner = self.lock();
            inner.cancel();
            self.shared.state.send_if_modified(|s| {
                let before = (s.is_detecting, s.is_model_loaded);
                s.is_detecting = false;
                s.is_model_loaded = false;
                before != (false, false)
            });
            std::mem::take(&mut inner.model)
        };
        if previous.release() {
            tracing::info!("face detection model released");
        }
    }

    /// Record `err` in state without touching the session. Call with the
    /// inner lock held.
    fn refuse_start(&self, err: EngineError) -> EngineError {
        self.shared.state.send_modify(|s| s.error = Some(err.to_string()));
        err
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.shared.inner)
    }
}

async fn run_loop(
    engine: Weak<Shared>,
    source: Arc<dyn VideoSource>,
    generation: u64,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if run_tick(&engine, source.as_ref(), generation).await.is_break() {
            break;
        }
    }
    tracing::debug!("detection loop exited");
}

/// One sampling step. `Break` means the loop has been superseded or the
/// engine dropped.
async fn run_tick(
    engine: &Weak<Shared>,
    source: &dyn VideoSource,
    generation: u64,
) -> ControlFlow<()> {
    let (detector, frame) = {
        let Some(shared) = engine.upgrade() else {
            return ControlFlow::Break(());
        };
        let mut inner = lock(&shared.inner);
        if inner.generation != generation {
            return ControlFlow::Break(());
        }
        if source.is_paused() || source.is_ended() {
            return ControlFlow::Continue(());
        }
        let Some(detector) = inner.model.detector() else {
            return ControlFlow::Continue(());
        };
        let Some(frame) = source.current_frame() else {
            return ControlFlow::Continue(());
        };
        if !inner.session.admit(frame.timestamp()) {
            tracing::trace!(timestamp = ?frame.timestamp(), "frame already processed");
            return ControlFlow::Continue(());
        }
        (detector, frame)
    };

    let timestamp = frame.timestamp();
    let result =
        tokio::task::spawn_blocking(move || lock(&detector).detect(&frame, timestamp)).await;

    let Some(shared) = engine.upgrade() else {
        return ControlFlow::Break(());
    };
    let mut inner = lock(&shared.inner);
    if inner.generation != generation {
        tracing::debug!(timestamp = ?timestamp, "discarding result from cancelled loop");
        return ControlFlow::Break(());
    }

    let detections = match result {
        Ok(Ok(detections)) => detections,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, timestamp = ?timestamp, "detection failed; skipping frame");
            return ControlFlow::Continue(());
        }
        Err(e) => {
            tracing::warn!(error = %e, timestamp = ?timestamp, "inference task failed; skipping frame");
            return ControlFlow::Continue(());
        }
    };

    let session = &mut inner.session;
    let mut applied = Ok(Vec::new());
    shared.state.send_if_modified(|state| {
        let before = state.clone();
        applied = session.apply(&detections, state);
        *state != before
    });

    match applied {
        Ok(events) => {
            for event in events {
                match &event {
                    PresenceEvent::FaceConfirmed { face } => tracing::info!(
                        x = face.x,
                        y = face.y,
                        w = face.w,
                        h = face.h,
                        confidence = face.confidence,
                        "face confirmed"
                    ),
                    PresenceEvent::FaceLost => tracing::info!("face lost"),
                    PresenceEvent::HeadTurnConfirmed { range_px } => {
                        tracing::info!(range_px, "head turn detected")
                    }
                }
                // No subscribers is fine.
                let _ = shared.events.send(event);
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, timestamp = ?timestamp, "could not decode detection; skipping frame");
        }
    }
    ControlFlow::Continue(())
}
