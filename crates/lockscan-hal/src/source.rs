//! [`CameraSource`] – where a capture session pulls its frames from.
//!
//! | Setting | Source |
//! |---|---|
//! | `device:0`, `device` | live video device 0 |
//! | `device:/dev/video2` | live video device by path or platform name |
//! | anything else | [`ImageSequenceCamera`] over a file or directory |

use std::fmt;
use std::path::PathBuf;

use lockscan_types::ScanError;

use crate::camera::Camera;
use crate::image_source::ImageSequenceCamera;

pub const DEVICE_PREFIX: &str = "device:";

const DEFAULT_DEVICE: &str = "0";

/// A parsed camera source setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraSource {
    /// Live video device: an index or a platform device name.
    Device(String),
    /// Still images replayed from disk.
    Files(PathBuf),
}

impl CameraSource {
    pub fn parse(setting: &str) -> Self {
        let setting = setting.trim();
        if setting == "device" {
            return CameraSource::Device(DEFAULT_DEVICE.to_string());
        }
        match setting.strip_prefix(DEVICE_PREFIX).map(str::trim) {
            Some("") => CameraSource::Device(DEFAULT_DEVICE.to_string()),
            Some(device) => CameraSource::Device(device.to_string()),
            None => CameraSource::Files(PathBuf::from(setting)),
        }
    }

    /// Open the source for one capture session.
    ///
    /// # Errors
    ///
    /// [`ScanError::DeviceUnavailable`] when the device or path cannot be
    /// opened, or when a live device is requested from a build without the
    /// `video-device` feature.
    pub fn open(&self) -> Result<Box<dyn Camera>, ScanError> {
        match self {
            CameraSource::Files(path) => Ok(Box::new(ImageSequenceCamera::open(path)?)),
            CameraSource::Device(device) => open_device(device),
        }
    }
}

impl fmt::Display for CameraSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraSource::Device(device) => write!(f, "{DEVICE_PREFIX}{device}"),
            CameraSource::Files(path) => write!(f, "{}", path.display()),
        }
    }
}

/// FFmpeg input format and URL for `device` on this platform.
///
/// A bare index maps to the platform's numbering (`/dev/videoN` on Linux);
/// any other value is passed through as the device name.
pub fn device_input(device: &str) -> (&'static str, String) {
    if cfg!(target_os = "macos") {
        ("avfoundation", device.to_string())
    } else if cfg!(target_os = "windows") {
        ("dshow", format!("video={device}"))
    } else {
        match device.parse::<u32>() {
            Ok(index) => ("v4l2", format!("/dev/video{index}")),
            Err(_) => ("v4l2", device.to_string()),
        }
    }
}

#[cfg(feature = "video-device")]
fn open_device(device: &str) -> Result<Box<dyn Camera>, ScanError> {
    Ok(Box::new(crate::device::VideoDeviceCamera::open(device)?))
}

#[cfg(not(feature = "video-device"))]
fn open_device(device: &str) -> Result<Box<dyn Camera>, ScanError> {
    Err(ScanError::DeviceUnavailable {
        device: format!("{DEVICE_PREFIX}{device}"),
        details: "this build has no video device support (enable the `video-device` feature) \
                  or point camera_source at an image directory"
            .to_string(),
    })
}
