//! Generic `Camera` trait and supporting types for image-capture hardware.

use lockscan_types::ScanError;
use tracing::debug;

/// Pixel layout of a [`CameraFrame`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit greyscale, one byte per pixel.
    Gray8,
    /// Packed RGB, three bytes per pixel.
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    pub format: PixelFormat,
    /// Raw pixel data, row-major, laid out per `format`.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// Build a greyscale frame.
    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Gray8,
            data,
        }
    }

    /// Build a packed RGB frame.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgb24,
            data,
        }
    }

    /// Number of bytes a well-formed buffer of this size and format holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// `true` when `data` is large enough for `width × height` pixels.
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.expected_len()
    }

    /// 8-bit luma of the pixel at (`x`, `y`).
    ///
    /// RGB frames use the BT.601 weights.  The caller must check
    /// [`is_complete`][Self::is_complete] first.
    pub fn luma(&self, x: usize, y: usize) -> u8 {
        let idx = y * self.width as usize + x;
        match self.format {
            PixelFormat::Gray8 => self.data[idx],
            PixelFormat::Rgb24 => {
                let px = &self.data[idx * 3..idx * 3 + 3];
                let weighted = u32::from(px[0]) * 299 + u32::from(px[1]) * 587 + u32::from(px[2]) * 114;
                (weighted / 1000) as u8
            }
        }
    }
}

/// A camera or image-capture device.
pub trait Camera: Send + Sync {
    /// Stable identifier for this camera, e.g. `"webcam0"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DeviceUnavailable`] if the frame cannot be
    /// captured (e.g. the device is disconnected or the source is exhausted).
    fn capture(&mut self) -> Result<CameraFrame, ScanError>;

    /// Release the underlying device.
    ///
    /// Called once by [`CaptureHandle`] when a capture session ends.
    fn release(&mut self) {}
}

/// Exclusive ownership of a [`Camera`] for one capture session.
///
/// The device is released exactly once: either by an explicit
/// [`release`][Self::release] call or when the handle is dropped.
pub struct CaptureHandle {
    camera: Box<dyn Camera>,
    released: bool,
}

impl CaptureHandle {
    pub fn new(camera: Box<dyn Camera>) -> Self {
        Self {
            camera,
            released: false,
        }
    }

    pub fn id(&self) -> &str {
        self.camera.id()
    }

    /// Capture the next frame.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DeviceUnavailable`] after the device has been
    /// released, or whatever the driver reports.
    pub fn capture(&mut self) -> Result<CameraFrame, ScanError> {
        if self.released {
            return Err(ScanError::DeviceUnavailable {
                device: self.camera.id().to_string(),
                details: "device already released".to_string(),
            });
        }
        self.camera.capture()
    }

    /// Release the device now.  Further calls are no-ops.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!(device = %self.camera.id(), "releasing capture device");
            self.camera.release();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockCamera {
        id: String,
        releases: Arc<AtomicUsize>,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn capture(&mut self) -> Result<CameraFrame, ScanError> {
            Ok(CameraFrame::rgb(2, 2, vec![0u8; 4 * 3])) // 2×2 RGB24
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn mock(releases: &Arc<AtomicUsize>) -> Box<dyn Camera> {
        Box::new(MockCamera {
            id: "webcam0".to_string(),
            releases: releases.clone(),
        })
    }

    #[test]
    fn mock_camera_capture() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut cam = mock(&releases);
        assert_eq!(cam.id(), "webcam0");
        let frame = cam.capture().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.data.len(), 12);
        assert!(frame.is_complete());
    }

    #[test]
    fn luma_of_rgb_uses_bt601_weights() {
        let frame = CameraFrame::rgb(2, 1, vec![255, 255, 255, 255, 0, 0]);
        assert_eq!(frame.luma(0, 0), 255);
        assert_eq!(frame.luma(1, 0), 76);
    }

    #[test]
    fn luma_of_gray_is_identity() {
        let frame = CameraFrame::gray(2, 2, vec![0, 10, 20, 30]);
        assert_eq!(frame.luma(1, 1), 30);
        assert_eq!(frame.expected_len(), 4);
    }

    #[test]
    fn short_buffer_is_incomplete() {
        let frame = CameraFrame::rgb(4, 4, vec![0u8; 10]);
        assert!(!frame.is_complete());
    }

    #[test]
    fn handle_releases_once_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let mut handle = CaptureHandle::new(mock(&releases));
            handle.capture().unwrap();
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_release_is_not_repeated_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut handle = CaptureHandle::new(mock(&releases));
        handle.release();
        handle.release();
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        drop(handle);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn capture_after_release_fails() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut handle = CaptureHandle::new(mock(&releases));
        handle.release();
        let err = handle.capture().unwrap_err();
        assert!(matches!(err, ScanError::DeviceUnavailable { .. }));
    }
}
