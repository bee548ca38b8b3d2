//! In-process simulated camera for CI/CD testing without a video device.
//!
//! [`SimCamera`] replays a scripted list of frames and then reports the
//! device as unavailable.  A [`SimCameraCounters`] obtained before the camera
//! is handed to a capture session lets the caller observe how many frames
//! were pulled and how many times the device was released.
//!
//! # Example
//!
//! ```rust
//! use lockscan_hal::{Camera, CameraFrame, SimCamera};
//!
//! let mut cam = SimCamera::new("sim0").with_frame(CameraFrame::gray(1, 1, vec![0]));
//! let counters = cam.counters();
//! cam.capture().expect("scripted frame");
//! cam.release();
//! assert_eq!(counters.captures(), 1);
//! assert_eq!(counters.releases(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use lockscan_types::ScanError;

use crate::camera::{Camera, CameraFrame};

#[derive(Debug, Default)]
struct Counters {
    captures: AtomicUsize,
    releases: AtomicUsize,
}

/// Read-only view of a [`SimCamera`]'s counters.
#[derive(Debug, Clone)]
pub struct SimCameraCounters(Arc<Counters>);

impl SimCameraCounters {
    /// Number of successful captures.
    pub fn captures(&self) -> usize {
        self.0.captures.load(Ordering::SeqCst)
    }

    /// Number of times the device was released.
    pub fn releases(&self) -> usize {
        self.0.releases.load(Ordering::SeqCst)
    }
}

/// A simulated camera that returns scripted frames in order.
pub struct SimCamera {
    id: String,
    frames: VecDeque<CameraFrame>,
    repeat_last: bool,
    counters: Arc<Counters>,
}

impl SimCamera {
    /// Create a simulated camera with no frames scripted.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            frames: VecDeque::new(),
            repeat_last: false,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Append a frame to the script.
    pub fn with_frame(mut self, frame: CameraFrame) -> Self {
        self.frames.push_back(frame);
        self
    }

    /// Append `count` blank 4×4 greyscale frames.
    pub fn with_blank_frames(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.frames.push_back(CameraFrame::gray(4, 4, vec![0u8; 16]));
        }
        self
    }

    /// Keep returning the last scripted frame instead of failing once the
    /// script runs out.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    pub fn counters(&self) -> SimCameraCounters {
        SimCameraCounters(self.counters.clone())
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, ScanError> {
        let frame = if self.repeat_last && self.frames.len() == 1 {
            self.frames.front().cloned()
        } else {
            self.frames.pop_front()
        };

        match frame {
            Some(frame) => {
                self.counters.captures.fetch_add(1, Ordering::SeqCst);
                Ok(frame)
            }
            None => Err(ScanError::DeviceUnavailable {
                device: self.id.clone(),
                details: "simulated frame script exhausted".to_string(),
            }),
        }
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
        self.frames.clear();
    }
}
