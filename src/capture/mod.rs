//! Camera lifecycle and still-frame capture

pub mod controller;
pub mod device;
pub mod error;
pub mod preview;
pub mod synthetic;

pub use controller::{CaptureController, CaptureState, CapturedPhoto};
pub use device::{CameraDevice, FacingMode, Frame, MediaStream, MediaTrack, VideoConstraints};
pub use error::CaptureError;
pub use preview::PreviewUrls;
pub use synthetic::{CameraPermission, SyntheticCamera};
