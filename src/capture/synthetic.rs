//! Test-pattern camera for the CLI and tests

use crate::capture::device::{CameraDevice, Frame, MediaStream, MediaTrack, VideoConstraints};
use crate::capture::error::CaptureError;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraPermission {
    Granted,
    Denied,
}

/// Camera producing a moving gradient with a little sensor noise.
///
/// Streams report `(0, 0)` dimensions until `warmup` has elapsed, like a
/// video element before its metadata loads.
pub struct SyntheticCamera {
    native_width: u32,
    native_height: u32,
    warmup: Duration,
    permission: CameraPermission,
    available: bool,
    issued: Mutex<Vec<Arc<MediaTrack>>>,
}

impl SyntheticCamera {
    pub fn new(native_width: u32, native_height: u32) -> Self {
        Self {
            native_width,
            native_height,
            warmup: Duration::ZERO,
            permission: CameraPermission::Granted,
            available: true,
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    pub fn with_permission(mut self, permission: CameraPermission) -> Self {
        self.permission = permission;
        self
    }

    /// A camera that is not plugged in.
    pub fn unavailable() -> Self {
        let mut camera = Self::new(0, 0);
        camera.available = false;
        camera
    }

    /// Tracks handed out by this camera that have not been stopped.
    pub fn live_tracks(&self) -> usize {
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    /// Streams opened so far.
    pub fn opened(&self) -> usize {
        self.issued.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl CameraDevice for SyntheticCamera {
    async fn open(
        &self,
        constraints: &VideoConstraints,
    ) -> Result<Box<dyn MediaStream>, CaptureError> {
        if !self.available {
            return Err(CaptureError::DeviceUnavailable(
                "no video input device found".to_string(),
            ));
        }
        if self.permission == CameraPermission::Denied {
            return Err(CaptureError::PermissionDenied(
                "user denied camera access".to_string(),
            ));
        }

        let width = constraints.ideal_width.min(self.native_width);
        let height = constraints.ideal_height.min(self.native_height);
        let track = MediaTrack::new(format!("synthetic camera ({:?})", constraints.facing_mode));
        self.issued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(track.clone());

        debug!("Synthetic camera opened at {}x{}", width, height);
        Ok(Box::new(SyntheticStream {
            track,
            width,
            height,
            ready_at: Instant::now() + self.warmup,
            frame_counter: AtomicU64::new(0),
        }))
    }
}

struct SyntheticStream {
    track: Arc<MediaTrack>,
    width: u32,
    height: u32,
    ready_at: Instant,
    frame_counter: AtomicU64,
}

impl SyntheticStream {
    fn render(&self, width: u32, height: u32, frame_no: u64) -> Frame {
        let mut rng = rand::thread_rng();
        let shift = (frame_no % 256) as u32;
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);

        for y in 0..height {
            for x in 0..width {
                let noise: i16 = rng.gen_range(-4..=4);
                let r = ((x * 255 / width.max(1) + shift) % 256) as i16 + noise;
                let g = (y * 255 / height.max(1)) as i16 + noise;
                let b = 128 + noise;
                rgb.extend_from_slice(&[
                    r.clamp(0, 255) as u8,
                    g.clamp(0, 255) as u8,
                    b.clamp(0, 255) as u8,
                ]);
            }
        }

        Frame { width, height, rgb }
    }
}

#[async_trait]
impl MediaStream for SyntheticStream {
    fn tracks(&self) -> Vec<Arc<MediaTrack>> {
        vec![self.track.clone()]
    }

    fn video_dimensions(&self) -> (u32, u32) {
        if Instant::now() >= self.ready_at {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    async fn ready(&self) {
        tokio::time::sleep_until(self.ready_at).await;
    }

    async fn grab_frame(&self, width: u32, height: u32) -> Result<Frame, CaptureError> {
        if !self.track.is_live() {
            return Err(CaptureError::StreamEnded);
        }
        let frame_no = self.frame_counter.fetch_add(1, Ordering::SeqCst);
        Ok(self.render(width, height, frame_no))
    }
}
