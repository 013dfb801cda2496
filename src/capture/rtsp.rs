//! RTSP capture sessions for IP cameras, via GStreamer.
//!
//! Pipeline: `rtspsrc ! decodebin ! videoconvert ! appsink` constrained to
//! packed RGB, with a one-buffer appsink so the session always reads the most
//! recent frame instead of building latency.

use std::time::Duration;

use anyhow::Context;

use crate::error::CaptureError;
use crate::frame::Frame;

use super::{CaptureSession, StreamSettings};

pub(crate) fn open_rtsp(
    url: &str,
    settings: &StreamSettings,
) -> Result<Box<dyn CaptureSession>, CaptureError> {
    let session = RtspSession::open(url, settings)
        .map_err(|err| CaptureError::connection(format!("{:#}", err)))?;
    Ok(Box::new(session))
}

struct RtspSession {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    read_timeout: Duration,
}

impl RtspSession {
    fn open(url: &str, settings: &StreamSettings) -> anyhow::Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let pipeline_description = format!(
            "rtspsrc location={} latency=0 ! decodebin ! videoconvert ! video/x-raw,format=RGB ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            url
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .context("build RTSP pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("RTSP pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set RTSP pipeline to Playing")?;

        log::info!("rtsp: connected to {}", url);
        Ok(Self {
            url: url.to_string(),
            pipeline,
            appsink,
            read_timeout: read_timeout(settings.fps),
        })
    }

    /// Drain pending bus messages; a posted error or EOS fails the next read.
    fn poll_bus(&self) -> Result<(), CaptureError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(message) = bus.timed_pop(Duration::from_millis(0)) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    return Err(CaptureError::read(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    )));
                }
                MessageView::Eos(..) => {
                    return Err(CaptureError::read("gstreamer reached EOS"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl CaptureSession for RtspSession {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.poll_bus()?;

        let sample = self
            .appsink
            .try_pull_sample(self.read_timeout)
            .map_err(|err| CaptureError::read(format!("pull sample from {}: {}", self.url, err)))?
            .ok_or_else(|| CaptureError::read(format!("stream {} stalled", self.url)))?;

        let (pixels, width, height) = sample_to_pixels(&sample)
            .map_err(|err| CaptureError::read(format!("{:#}", err)))?;
        Ok(Frame::new(pixels, width, height, 3))
    }
}

impl Drop for RtspSession {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("rtsp {}: failed to tear down pipeline: {}", self.url, err);
        }
    }
}

/// Allow four frame intervals before declaring a read stalled, never less
/// than 500 ms.
fn read_timeout(fps: u32) -> Duration {
    let base_ms = if fps == 0 {
        500
    } else {
        (1000 / fps).saturating_mul(4)
    };
    Duration::from_millis(base_ms.max(500) as u64)
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> anyhow::Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("RTSP sample missing buffer")?;
    let caps = sample.caps().context("RTSP sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse RTSP caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride(0) as usize;

    let map = buffer.map_readable().context("map RTSP buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    // Strided buffer: repack rows tightly.
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("RTSP buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
