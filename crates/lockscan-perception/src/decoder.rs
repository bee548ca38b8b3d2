//! Decoder adapter: camera frame in, zero or more decoded payloads out.
//!
//! Each call is independent; no state is kept between frames.  When a frame
//! holds several symbols they are returned in detection order, which callers
//! must treat as unordered.

use lockscan_hal::CameraFrame;
use lockscan_types::DecodedPayload;
use tracing::{debug, warn};

/// Extracts text payloads from a single image frame.
pub trait Decoder: Send + Sync {
    fn decode(&self, frame: &CameraFrame) -> Vec<DecodedPayload>;
}

/// QR code decoder backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrDecoder;

impl QrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for QrDecoder {
    fn decode(&self, frame: &CameraFrame) -> Vec<DecodedPayload> {
        if frame.width == 0 || frame.height == 0 {
            return Vec::new();
        }
        if !frame.is_complete() {
            warn!(
                width = frame.width,
                height = frame.height,
                len = frame.data.len(),
                expected = frame.expected_len(),
                "frame buffer too short, skipping"
            );
            return Vec::new();
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            frame.width as usize,
            frame.height as usize,
            |x, y| frame.luma(x, y),
        );

        prepared
            .detect_grids()
            .into_iter()
            .filter_map(|grid| match grid.decode() {
                Ok((_meta, content)) => Some(DecodedPayload::from(content)),
                Err(e) => {
                    debug!(error = %e, "QR grid detected but not decodable");
                    None
                }
            })
            .collect()
    }
}
