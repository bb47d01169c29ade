//! Camera device abstraction

use crate::capture::error::CaptureError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub audio: bool,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            audio: false,
        }
    }
}

/// One acquired device track. Stopping is idempotent.
#[derive(Debug)]
pub struct MediaTrack {
    id: String,
    label: String,
    live: AtomicBool,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.into(),
            live: AtomicBool::new(true),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Raw RGB8 frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn validate(&self) -> Result<(), CaptureError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.width == 0 || self.height == 0 || self.rgb.len() != expected {
            return Err(CaptureError::InvalidFrame(format!(
                "{}x{} frame with {} bytes",
                self.width,
                self.height,
                self.rgb.len()
            )));
        }
        Ok(())
    }
}

#[async_trait]
pub trait MediaStream: Send + Sync {
    fn tracks(&self) -> Vec<Arc<MediaTrack>>;

    /// Reported video size; `(0, 0)` until the first frame is decodable.
    fn video_dimensions(&self) -> (u32, u32);

    /// Resolve once a frame can be drawn.
    async fn ready(&self);

    /// Current frame scaled to `width` x `height`.
    async fn grab_frame(&self, width: u32, height: u32) -> Result<Frame, CaptureError>;

    fn active_tracks(&self) -> usize {
        self.tracks().iter().filter(|t| t.is_live()).count()
    }

    fn stop_all(&self) {
        for track in self.tracks() {
            track.stop();
        }
    }
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Request access to a video stream matching `constraints`.
    async fn open(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError>;
}
