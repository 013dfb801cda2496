//! Per-frame callback dispatch.
//!
//! User code receives `(camera_id, frame)` synchronously on the capture
//! worker's own path, immediately after the store write. The dispatcher is
//! the fault boundary: a sink that returns an error or panics is logged and
//! the worker's loop continues untouched, so one misbehaving callback cannot
//! starve other cameras or stop store updates.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::frame::{CameraId, Frame};

/// A consumer of live frames.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, camera_id: CameraId, frame: &Frame) -> anyhow::Result<()>;
}

/// Adapts a plain closure into a [`FrameSink`].
pub struct CallbackSink<F>
where
    F: Fn(CameraId, &Frame) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(CameraId, &Frame) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FrameSink for CallbackSink<F>
where
    F: Fn(CameraId, &Frame) + Send + Sync,
{
    fn on_frame(&self, camera_id: CameraId, frame: &Frame) -> anyhow::Result<()> {
        (self.callback)(camera_id, frame);
        Ok(())
    }
}

/// Invokes a sink behind a capture-and-log boundary.
#[derive(Clone)]
pub(crate) struct FrameDispatcher {
    sink: Arc<dyn FrameSink>,
}

impl FrameDispatcher {
    pub(crate) fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn dispatch(&self, camera_id: CameraId, frame: &Frame) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.sink.on_frame(camera_id, frame)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::warn!("camera {}: frame callback failed: {:#}", camera_id, err);
            }
            Err(_) => {
                log::warn!("camera {}: frame callback panicked", camera_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn frame() -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, 3)
    }

    #[test]
    fn callback_sink_receives_frames() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_in_sink = seen.clone();
        let sink = CallbackSink::new(move |_, _: &Frame| {
            seen_in_sink.fetch_add(1, Ordering::SeqCst);
        });
        let dispatcher = FrameDispatcher::new(Arc::new(sink));
        dispatcher.dispatch(0, &frame());
        dispatcher.dispatch(0, &frame());
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_sink_does_not_unwind_into_the_caller() {
        struct Panicker;
        impl FrameSink for Panicker {
            fn on_frame(&self, _: CameraId, _: &Frame) -> anyhow::Result<()> {
                panic!("callback bug");
            }
        }
        let dispatcher = FrameDispatcher::new(Arc::new(Panicker));
        dispatcher.dispatch(3, &frame());
        dispatcher.dispatch(3, &frame());
    }

    #[test]
    fn erroring_sink_is_logged_not_propagated() {
        struct Failing;
        impl FrameSink for Failing {
            fn on_frame(&self, _: CameraId, _: &Frame) -> anyhow::Result<()> {
                Err(anyhow::anyhow!("downstream full"))
            }
        }
        let dispatcher = FrameDispatcher::new(Arc::new(Failing));
        dispatcher.dispatch(1, &frame());
    }
}
