//! Capture session state machine
//!
//! Idle -> Requesting -> Streaming -> Captured -> Idle (remove / retry)
//!
//! The controller owns at most one camera stream. Starting again releases the
//! previous stream first, and dropping the controller releases everything it
//! still holds, preview URLs included.

use crate::capture::device::{CameraDevice, MediaStream, VideoConstraints};
use crate::capture::error::CaptureError;
use crate::capture::preview::PreviewUrls;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const JPEG_QUALITY: u8 = 90;

/// Canvas size used when the stream never reports its dimensions.
pub const FALLBACK_WIDTH: u32 = 720;
pub const FALLBACK_HEIGHT: u32 = 1280;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Requesting,
    Streaming,
    Captured,
}

#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub file_name: String,
    pub preview_url: String,
}

pub struct CaptureController {
    device: Arc<dyn CameraDevice>,
    constraints: VideoConstraints,
    state: CaptureState,
    stream: Option<Box<dyn MediaStream>>,
    photo: Option<CapturedPhoto>,
    previews: PreviewUrls,
}

impl CaptureController {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self::with_constraints(device, VideoConstraints::default())
    }

    pub fn with_constraints(device: Arc<dyn CameraDevice>, constraints: VideoConstraints) -> Self {
        Self {
            device,
            constraints,
            state: CaptureState::Idle,
            stream: None,
            photo: None,
            previews: PreviewUrls::new(),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn photo(&self) -> Option<&CapturedPhoto> {
        self.photo.as_ref()
    }

    pub fn previews(&self) -> &PreviewUrls {
        &self.previews
    }

    pub fn active_tracks(&self) -> usize {
        self.stream.as_ref().map_or(0, |s| s.active_tracks())
    }

    /// Acquire the camera. On failure the session is back at Idle.
    pub async fn start(&mut self) -> Result<(), CaptureError> {
        self.release_stream();
        self.state = CaptureState::Requesting;
        info!("Starting camera ({:?})", self.constraints.facing_mode);

        match self.device.open(&self.constraints).await {
            Ok(stream) => {
                let (w, h) = stream.video_dimensions();
                debug!("Media stream acquired, reported {}x{}", w, h);
                self.stream = Some(stream);
                self.state = CaptureState::Streaming;
                Ok(())
            }
            Err(e) => {
                warn!("Error accessing camera: {}", e);
                self.state = if self.photo.is_some() {
                    CaptureState::Captured
                } else {
                    CaptureState::Idle
                };
                Err(e)
            }
        }
    }

    /// Grab the current frame as a JPEG and stop the camera.
    pub async fn capture(&mut self) -> Result<&CapturedPhoto, CaptureError> {
        let stream = match (&self.stream, self.state) {
            (Some(stream), CaptureState::Streaming) => stream,
            _ => return Err(CaptureError::NotStreaming),
        };

        let (w, h) = stream.video_dimensions();
        if w == 0 || h == 0 {
            debug!("Waiting for the first decodable frame ({}x{})", w, h);
            stream.ready().await;
        }

        // Each axis falls back on its own.
        let (w, h) = stream.video_dimensions();
        let width = if w == 0 { FALLBACK_WIDTH } else { w };
        let height = if h == 0 { FALLBACK_HEIGHT } else { h };

        let frame = stream.grab_frame(width, height).await?;
        frame.validate()?;

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode(
            &frame.rgb,
            frame.width,
            frame.height,
            ColorType::Rgb8,
        )?;

        if let Some(previous) = self.photo.take() {
            self.previews.revoke(&previous.preview_url);
        }
        let preview_url = self.previews.create(&jpeg);
        let file_name = format!("user-{}.jpg", Utc::now().timestamp_millis());

        info!("Photo captured locally: {}x{} ({} bytes)", frame.width, frame.height, jpeg.len());
        self.release_stream();
        self.state = CaptureState::Captured;

        let photo = self.photo.insert(CapturedPhoto {
            jpeg,
            width: frame.width,
            height: frame.height,
            file_name,
            preview_url,
        });
        Ok(&*photo)
    }

    /// Release every acquired track. Safe to call in any state. A photo
    /// taken before a cancelled retake is kept.
    pub fn stop(&mut self) {
        self.release_stream();
        self.state = if self.photo.is_some() {
            CaptureState::Captured
        } else {
            CaptureState::Idle
        };
    }

    /// Discard the captured photo and go back to Idle.
    pub fn remove(&mut self) {
        self.release_stream();
        if let Some(photo) = self.photo.take() {
            self.previews.revoke(&photo.preview_url);
        }
        self.state = CaptureState::Idle;
    }

    /// Hand the captured photo to the caller, leaving the session Idle.
    pub fn take_photo(&mut self) -> Option<CapturedPhoto> {
        let photo = self.photo.take()?;
        self.previews.revoke(&photo.preview_url);
        self.state = CaptureState::Idle;
        Some(photo)
    }

    fn release_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop_all();
            debug!("Camera stream released");
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.release_stream();
        self.previews.revoke_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::{Frame, MediaTrack};
    use crate::capture::synthetic::{CameraPermission, SyntheticCamera};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Reports a known width but no height until `ready` resolves.
    struct HalfReadyStream {
        track: Arc<MediaTrack>,
        ready: AtomicBool,
    }

    #[async_trait]
    impl MediaStream for HalfReadyStream {
        fn tracks(&self) -> Vec<Arc<MediaTrack>> {
            vec![self.track.clone()]
        }

        fn video_dimensions(&self) -> (u32, u32) {
            if self.ready.load(Ordering::SeqCst) {
                (64, 48)
            } else {
                (64, 0)
            }
        }

        async fn ready(&self) {
            self.ready.store(true, Ordering::SeqCst);
        }

        async fn grab_frame(&self, width: u32, height: u32) -> Result<Frame, CaptureError> {
            Ok(Frame {
                width,
                height,
                rgb: vec![128; width as usize * height as usize * 3],
            })
        }
    }

    struct HalfReadyCamera;

    #[async_trait]
    impl CameraDevice for HalfReadyCamera {
        async fn open(
            &self,
            _constraints: &VideoConstraints,
        ) -> Result<Box<dyn MediaStream>, CaptureError> {
            Ok(Box::new(HalfReadyStream {
                track: MediaTrack::new("half-ready"),
                ready: AtomicBool::new(false),
            }))
        }
    }

    fn controller(camera: SyntheticCamera) -> (Arc<SyntheticCamera>, CaptureController) {
        let camera = Arc::new(camera);
        (camera.clone(), CaptureController::new(camera))
    }

    #[tokio::test]
    async fn stop_after_start_leaves_no_live_tracks() {
        let (camera, mut capture) = controller(SyntheticCamera::new(640, 480));

        capture.start().await.unwrap();
        assert_eq!(capture.state(), CaptureState::Streaming);
        assert_eq!(camera.live_tracks(), 1);

        capture.stop();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(capture.active_tracks(), 0);
        assert_eq!(camera.live_tracks(), 0);
    }

    #[tokio::test]
    async fn permission_denied_returns_to_idle() {
        let (camera, mut capture) =
            controller(SyntheticCamera::new(640, 480).with_permission(CameraPermission::Denied));

        assert!(matches!(capture.start().await, Err(CaptureError::PermissionDenied(_))));
        assert_eq!(capture.state(), CaptureState::Idle);
        assert_eq!(camera.live_tracks(), 0);
    }

    #[tokio::test]
    async fn missing_device_returns_to_idle() {
        let (_, mut capture) = controller(SyntheticCamera::unavailable());

        assert!(matches!(capture.start().await, Err(CaptureError::DeviceUnavailable(_))));
        assert_eq!(capture.state(), CaptureState::Idle);
    }

    #[tokio::test]
    async fn captured_jpeg_matches_video_dimensions() {
        let (camera, mut capture) = controller(SyntheticCamera::new(320, 240));
        capture.start().await.unwrap();

        let photo = capture.capture().await.unwrap().clone();
        let decoded = image::load_from_memory(&photo.jpeg).unwrap();

        assert_eq!((decoded.width(), decoded.height()), (320, 240));
        assert_eq!((photo.width, photo.height), (320, 240));
        assert!(photo.file_name.starts_with("user-") && photo.file_name.ends_with(".jpg"));
        assert_eq!(capture.state(), CaptureState::Captured);
        assert_eq!(camera.live_tracks(), 0, "capturing stops the camera");
    }

    #[tokio::test]
    async fn capture_waits_for_the_first_decodable_frame() {
        let (_, mut capture) = controller(
            SyntheticCamera::new(160, 120).with_warmup(Duration::from_millis(40)),
        );
        capture.start().await.unwrap();

        let photo = capture.capture().await.unwrap();
        assert_eq!((photo.width, photo.height), (160, 120));
    }

    #[tokio::test]
    async fn one_unknown_axis_still_waits_for_the_frame() {
        let mut capture = CaptureController::new(Arc::new(HalfReadyCamera));
        capture.start().await.unwrap();

        let photo = capture.capture().await.unwrap();
        assert_eq!((photo.width, photo.height), (64, 48));
    }

    #[tokio::test]
    async fn cancelled_retake_keeps_the_previous_photo() {
        let (camera, mut capture) = controller(SyntheticCamera::new(64, 48));
        capture.start().await.unwrap();
        let preview = capture.capture().await.unwrap().preview_url.clone();

        capture.start().await.unwrap();
        capture.stop();

        assert_eq!(capture.state(), CaptureState::Captured);
        assert_eq!(capture.photo().map(|p| p.preview_url.as_str()), Some(preview.as_str()));
        assert_eq!(capture.previews().live_count(), 1);
        assert_eq!(camera.live_tracks(), 0);
    }

    #[tokio::test]
    async fn capture_requires_a_stream() {
        let (_, mut capture) = controller(SyntheticCamera::new(160, 120));
        assert!(matches!(capture.capture().await, Err(CaptureError::NotStreaming)));
    }

    #[tokio::test]
    async fn restarting_releases_the_previous_stream() {
        let (camera, mut capture) = controller(SyntheticCamera::new(160, 120));

        capture.start().await.unwrap();
        capture.start().await.unwrap();
        assert_eq!(camera.opened(), 2);
        assert_eq!(camera.live_tracks(), 1);
    }

    #[tokio::test]
    async fn retake_revokes_the_superseded_preview() {
        let (_, mut capture) = controller(SyntheticCamera::new(64, 48));

        capture.start().await.unwrap();
        let first = capture.capture().await.unwrap().preview_url.clone();
        capture.start().await.unwrap();
        let second = capture.capture().await.unwrap().preview_url.clone();

        assert_ne!(first, second);
        assert!(capture.previews().resolve(&first).is_none());
        assert!(capture.previews().resolve(&second).is_some());
        assert_eq!(capture.previews().live_count(), 1);
    }

    #[tokio::test]
    async fn remove_goes_back_to_idle_and_revokes_preview() {
        let (_, mut capture) = controller(SyntheticCamera::new(64, 48));
        capture.start().await.unwrap();
        capture.capture().await.unwrap();

        capture.remove();
        assert_eq!(capture.state(), CaptureState::Idle);
        assert!(capture.photo().is_none());
        assert_eq!(capture.previews().live_count(), 0);
    }

    #[tokio::test]
    async fn dropping_the_session_releases_the_camera() {
        let camera = Arc::new(SyntheticCamera::new(64, 48));
        {
            let mut capture = CaptureController::new(camera.clone());
            capture.start().await.unwrap();
            assert_eq!(camera.live_tracks(), 1);
        }
        assert_eq!(camera.live_tracks(), 0);
    }
}
