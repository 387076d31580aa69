//! facecheck-hw — Webcam capture.
//!
//! Provides V4L2-based camera access and conversion of every supported
//! capture format to RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
