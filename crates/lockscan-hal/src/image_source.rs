//! [`ImageSequenceCamera`] – replays still images from disk as frames.
//!
//! Points at either a single image file or a directory of images.  Directory
//! entries are replayed in file-name order; once every image has been
//! delivered the source reports [`ScanError::DeviceUnavailable`], the same
//! way a disconnected webcam stops producing frames.

use std::fs;
use std::path::{Path, PathBuf};

use lockscan_types::ScanError;
use tracing::{debug, info};

use crate::camera::{Camera, CameraFrame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

/// A camera backed by image files.
pub struct ImageSequenceCamera {
    id: String,
    frames: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceCamera {
    /// Open `source`, a single image or a directory of images.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DeviceUnavailable`] when the path does not exist,
    /// cannot be listed, or holds no image files.
    pub fn open(source: impl AsRef<Path>) -> Result<Self, ScanError> {
        let source = source.as_ref();
        let id = source.display().to_string();
        let unavailable = |details: String| ScanError::DeviceUnavailable {
            device: id.clone(),
            details,
        };

        let frames = if source.is_dir() {
            let mut frames: Vec<PathBuf> = fs::read_dir(source)
                .map_err(|e| unavailable(format!("cannot list directory: {e}")))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            frames.sort();
            frames
        } else if source.is_file() {
            vec![source.to_path_buf()]
        } else {
            return Err(unavailable("no such file or directory".to_string()));
        };

        if frames.is_empty() {
            return Err(unavailable("no image files found".to_string()));
        }

        info!(device = %id, frames = frames.len(), "opened image sequence");
        Ok(Self { id, frames, next: 0 })
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Camera for ImageSequenceCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, ScanError> {
        let path = self
            .frames
            .get(self.next)
            .ok_or_else(|| ScanError::DeviceUnavailable {
                device: self.id.clone(),
                details: "no more frames".to_string(),
            })?;
        self.next += 1;

        let img = image::open(path)
            .map_err(|e| ScanError::DeviceUnavailable {
                device: self.id.clone(),
                details: format!("cannot read {}: {e}", path.display()),
            })?
            .to_luma8();
        debug!(frame = %path.display(), width = img.width(), height = img.height(), "captured frame");

        let (width, height) = img.dimensions();
        Ok(CameraFrame::gray(width, height, img.into_raw()))
    }

    fn release(&mut self) {
        self.next = self.frames.len();
    }
}
