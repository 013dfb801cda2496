//! V4L2 capture sessions for local USB cameras.
//!
//! Device index `n` maps to `/dev/videon`. Format and rate requests are
//! best-effort: if the driver rejects them the session keeps whatever the
//! device reports, and the worker streams at that geometry.

use anyhow::Context;
use ouroboros::self_referencing;

use crate::error::CaptureError;
use crate::frame::Frame;

use super::{CaptureSession, StreamSettings};

pub(crate) fn open_device(
    index: u32,
    settings: &StreamSettings,
) -> Result<Box<dyn CaptureSession>, CaptureError> {
    let session = V4l2Session::open(index, settings)
        .map_err(|err| CaptureError::connection(format!("{:#}", err)))?;
    Ok(Box::new(session))
}

struct V4l2Session {
    path: String,
    state: V4l2State,
    active_width: u32,
    active_height: u32,
}

// The mmap stream borrows the device, so both live in one self-referencing
// struct that is torn down together on drop (which releases the device).
#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Session {
    fn open(index: u32, settings: &StreamSettings) -> anyhow::Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = format!("/dev/video{}", index);
        let mut device =
            v4l::Device::with_path(&path).with_context(|| format!("open v4l2 device {}", path))?;

        let mut format = device.format().context("read v4l2 format")?;
        format.width = settings.width;
        format.height = settings.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("v4l2 {}: failed to set format: {}", path, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if settings.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(settings.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("v4l2 {}: failed to set fps: {}", path, err);
            }
        }

        let active_width = format.width;
        let active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "v4l2 {}: opened at {}x{}",
            path,
            active_width,
            active_height
        );
        Ok(Self {
            path,
            state,
            active_width,
            active_height,
        })
    }
}

impl CaptureSession for V4l2Session {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        use v4l::io::traits::CaptureStream;

        let (buf, _meta) = self
            .state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| CaptureError::read(format!("capture from {}: {}", self.path, err)))?;

        Ok(Frame::new(
            buf.to_vec(),
            self.active_width,
            self.active_height,
            3,
        ))
    }
}
