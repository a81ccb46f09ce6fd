//! The lazy frame sequence consumed by the monitoring loop

use tracing::{error, info};

use crate::frame::VideoFrame;
use crate::source::FrameSource;

/// Lazy, non-restartable sequence of frames.
///
/// Owns its source. The first end-of-stream or capture error terminates the
/// sequence for good and closes the source; dropping the sequence early
/// closes it as well.
pub struct Frames<S: FrameSource> {
    source: S,
    finished: bool,
    delivered: u64,
}

impl<S: FrameSource> Frames<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            finished: false,
            delivered: 0,
        }
    }

    /// Frames yielded so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Whether the sequence has terminated
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.source.close();
            info!("Frame sequence closed after {} frames", self.delivered);
        }
    }
}

impl<S: FrameSource> Iterator for Frames<S> {
    type Item = VideoFrame;

    fn next(&mut self) -> Option<VideoFrame> {
        if self.finished {
            return None;
        }

        match self.source.read_frame() {
            Ok(Some(frame)) => {
                self.delivered += 1;
                Some(frame)
            }
            Ok(None) => {
                info!("Camera reported end of stream");
                self.finish();
                None
            }
            Err(e) => {
                error!("Frame capture failed: {}", e);
                self.finish();
                None
            }
        }
    }
}

impl<S: FrameSource> std::iter::FusedIterator for Frames<S> {}

impl<S: FrameSource> Drop for Frames<S> {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CameraError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Yields `frames` frames, then either ends or fails
    struct ScriptedSource {
        remaining: usize,
        fail_at_end: bool,
        reads_after_end: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
            if self.remaining == 0 {
                self.reads_after_end.fetch_add(1, Ordering::SeqCst);
                return if self.fail_at_end {
                    Err(CameraError::Stream("device unplugged".into()))
                } else {
                    Ok(None)
                };
            }
            self.remaining -= 1;
            Ok(Some(VideoFrame::new(vec![0; 3], 1, 1, 0, 0)))
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted(remaining: usize, fail_at_end: bool) -> (ScriptedSource, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let source = ScriptedSource {
            remaining,
            fail_at_end,
            reads_after_end: reads.clone(),
            closes: closes.clone(),
        };
        (source, reads, closes)
    }

    #[test]
    fn test_end_of_stream_closes_once_and_stays_closed() {
        let (source, reads, closes) = scripted(3, false);
        let mut frames = Frames::new(source);

        assert_eq!(frames.by_ref().count(), 3);
        assert!(frames.is_finished());
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());

        // Not restarted: the source was polled past its end exactly once
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        drop(frames);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_error_terminates_sequence() {
        let (source, _reads, closes) = scripted(2, true);
        let mut frames = Frames::new(source);

        assert_eq!(frames.by_ref().count(), 2);
        assert_eq!(frames.delivered(), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_early_drop_releases_source() {
        let (source, _reads, closes) = scripted(100, false);
        let mut frames = Frames::new(source);
        assert!(frames.next().is_some());

        drop(frames);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
