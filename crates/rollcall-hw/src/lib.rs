//! rollcall-hw: Camera capture for live recognition sessions.
//!
//! Provides V4L2-based camera access and pixel-format conversion to RGB.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
