//! Error types for camera capture

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Camera is not streaming")]
    NotStreaming,

    #[error("Camera stream ended")]
    StreamEnded,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}
