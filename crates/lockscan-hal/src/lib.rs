//! `lockscan-hal` – capture-device abstraction.
//!
//! The scan pipeline never talks to a video device directly.  It pulls
//! frames through the [`Camera`] trait and hands the device to a
//! [`CaptureHandle`] for the duration of a capture session, which guarantees
//! the device is released exactly once.
//!
//! # Modules
//!
//! - [`camera`] – [`Camera`], [`CameraFrame`], [`PixelFormat`] and the
//!   [`CaptureHandle`] release guard.
//! - [`image_source`] – [`ImageSequenceCamera`]: replays still images from
//!   disk as camera frames.
//! - [`source`] – [`CameraSource`]: picks a live device or an image path
//!   from the `camera_source` setting and opens it.
//! - `device` – `VideoDeviceCamera` (feature `video-device`): live frames
//!   through FFmpeg.
//! - [`sim`] – [`SimCamera`]: scripted in-process camera for headless runs
//!   and tests.

pub mod camera;
#[cfg(feature = "video-device")]
pub mod device;
pub mod image_source;
pub mod sim;
pub mod source;

pub use camera::{Camera, CameraFrame, CaptureHandle, PixelFormat};
pub use image_source::ImageSequenceCamera;
pub use sim::{SimCamera, SimCameraCounters};
pub use source::CameraSource;
#[cfg(feature = "video-device")]
pub use device::VideoDeviceCamera;
