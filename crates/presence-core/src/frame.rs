use std::sync::Arc;
use std::time::Duration;

/// A single video frame handed to the detector.
///
/// Pixels are shared so a frame can be cloned into the inference task
/// without copying the buffer. The timestamp is the source's presentation
/// time and is what the detection loop deduplicates on.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Arc<[u8]>,
    width: u32,
    height: u32,
    channels: u8,
    timestamp: Duration,
}

impl Frame {
    pub fn new(
        pixels: Arc<[u8]>,
        width: u32,
        height: u32,
        channels: u8,
        timestamp: Duration,
    ) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
            timestamp,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Same pixels, new presentation time.
    pub fn with_timestamp(&self, timestamp: Duration) -> Self {
        Self {
            pixels: Arc::clone(&self.pixels),
            timestamp,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_and_accessors() {
        let pixels: Arc<[u8]> = vec![7u8; 12].into();
        let frame = Frame::new(pixels, 2, 2, 3, Duration::from_millis(40));
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.timestamp(), Duration::from_millis(40));
        assert_eq!(frame.pixels(), &[7u8; 12][..]);
    }

    #[test]
    fn test_with_timestamp_shares_pixels() {
        let pixels: Arc<[u8]> = vec![0u8; 6].into();
        let frame = Frame::new(pixels, 2, 1, 3, Duration::ZERO);
        let later = frame.with_timestamp(Duration::from_millis(100));
        assert_eq!(later.timestamp(), Duration::from_millis(100));
        assert!(std::ptr::eq(frame.pixels().as_ptr(), later.pixels().as_ptr()));
    }
}
