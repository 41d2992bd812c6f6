use presence_core::Frame;

/// Live frame source sampled by the detection loop.
///
/// Mirrors what a video element exposes: playback status and the frame
/// currently on screen. Called from the loop task while the engine's state
/// lock is held, so implementations must not block.
pub trait VideoSource: Send + Sync + 'static {
    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Frame currently presented, or `None` before the first one decodes.
    fn current_frame(&self) -> Option<Frame>;
}
