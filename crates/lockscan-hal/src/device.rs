//! [`VideoDeviceCamera`] – live frames from a video capture device.
//!
//! Opens the device through FFmpeg's device demuxers (`v4l2`, `avfoundation`
//! or `dshow`, see [`device_input`]), decodes its video stream and converts
//! every picture to 8-bit greyscale.  Only built with the `video-device`
//! feature, which links against the system FFmpeg libraries.

use std::sync::Mutex;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::format::context::Input;
use ffmpeg::software::scaling;
use ffmpeg::{Dictionary, Packet, codec, decoder, frame, media};
use lockscan_types::ScanError;
use tracing::{debug, info};

use crate::camera::{Camera, CameraFrame};
use crate::source::device_input;

struct DeviceStream {
    input: Input,
    decoder: decoder::Video,
    scaler: scaling::Context,
    index: usize,
}

// SAFETY: the FFmpeg contexts are owned by this struct alone and are only
// reached through `&mut` access; they are moved between threads, never shared.
unsafe impl Send for DeviceStream {}

impl DeviceStream {
    /// Read packets until the decoder yields a picture, then scale it to Gray8.
    fn next_frame(&mut self) -> Result<CameraFrame, ffmpeg::Error> {
        let mut decoded = frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_err() {
            let mut packet = Packet::empty();
            packet.read(&mut self.input)?;
            if packet.stream() == self.index {
                self.decoder.send_packet(&packet)?;
            }
        }

        let mut gray = frame::Video::empty();
        self.scaler.run(&decoded, &mut gray)?;

        let (width, height) = (gray.width(), gray.height());
        let stride = gray.stride(0);
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for row in gray.data(0).chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..width as usize]);
        }
        Ok(CameraFrame::gray(width, height, data))
    }
}

/// A live camera, e.g. `/dev/video0`.
pub struct VideoDeviceCamera {
    id: String,
    stream: Mutex<Option<DeviceStream>>,
}

impl VideoDeviceCamera {
    /// Open `device`: an index (`"0"`) or a platform device name.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::DeviceUnavailable`] when FFmpeg cannot open the
    /// device or it has no decodable video stream.
    pub fn open(device: &str) -> Result<Self, ScanError> {
        let (format_name, url) = device_input(device);
        let id = format!("{format_name}:{url}");
        let unavailable = |details: String| ScanError::DeviceUnavailable {
            device: id.clone(),
            details,
        };

        ffmpeg::init().map_err(|e| unavailable(format!("FFmpeg init failed: {e}")))?;
        ffmpeg::device::register_all();

        let format = ffmpeg::device::input::video()
            .find_map(|f| match f {
                ffmpeg::Format::Input(input) if input.name() == format_name => Some(input),
                _ => None,
            })
            .ok_or_else(|| unavailable(format!("input format {format_name} not available")))?;

        let input = ffmpeg::format::open_with(
            &url,
            &ffmpeg::Format::Input(format),
            Dictionary::new(),
        )
        .map_err(|e| unavailable(format!("cannot open device: {e}")))?
        .input();

        let stream = input
            .streams()
            .best(media::Type::Video)
            .ok_or_else(|| unavailable("device has no video stream".to_string()))?;
        let index = stream.index();
        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| unavailable(format!("no decoder for device stream: {e}")))?;

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(format!("cannot convert device pixels: {e}")))?;

        info!(
            device = %id,
            width = decoder.width(),
            height = decoder.height(),
            "opened video device"
        );
        Ok(Self {
            id,
            stream: Mutex::new(Some(DeviceStream {
                input,
                decoder,
                scaler,
                index,
            })),
        })
    }
}

impl Camera for VideoDeviceCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, ScanError> {
        let unavailable = |details: String| ScanError::DeviceUnavailable {
            device: self.id.clone(),
            details,
        };
        let mut slot = self
            .stream
            .lock()
            .map_err(|_| unavailable("device state poisoned".to_string()))?;
        let stream = slot
            .as_mut()
            .ok_or_else(|| unavailable("device released".to_string()))?;
        stream
            .next_frame()
            .map_err(|e| unavailable(format!("capture failed: {e}")))
    }

    fn release(&mut self) {
        if let Ok(mut slot) = self.stream.lock()
            && slot.take().is_some()
        {
            debug!(device = %self.id, "closed video device");
        }
    }
}
