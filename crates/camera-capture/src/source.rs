//! Frame source capability and the directory replay source

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::frame::VideoFrame;
use crate::CameraError;

/// A blocking producer of video frames.
///
/// `Ok(None)` signals end of stream. Implementations release their device or
/// file handles in [`FrameSource::close`]; it may be called more than once.
pub trait FrameSource: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Release the underlying resources
    fn close(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).read_frame()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Replays the still images of a directory in lexical order
pub struct DirectorySource {
    files: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
    opened_at: Instant,
    sequence: u32,
    closed: bool,
}

impl DirectorySource {
    /// Open a directory of frames
    pub fn open(dir: impl AsRef<Path>, looping: bool, fps: u32) -> Result<Self, CameraError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!(
                "{}: no image frames found",
                dir.display()
            )));
        }

        info!(
            "Opened frame directory {} ({} frames, looping={}, fps={})",
            dir.display(),
            files.len(),
            looping,
            fps
        );

        Ok(Self {
            files,
            cursor: 0,
            looping,
            frame_interval: (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64)),
            last_frame: None,
            opened_at: Instant::now(),
            sequence: 0,
            closed: false,
        })
    }

    /// Number of frames in one pass over the directory
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the directory holds no frames
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.closed {
            return Ok(None);
        }
        if self.cursor >= self.files.len() {
            if !self.looping {
                return Ok(None);
            }
            debug!("Frame directory exhausted, rewinding");
            self.cursor = 0;
        }

        let path = &self.files[self.cursor];
        let img = image::open(path)
            .map_err(|e| CameraError::Decode(format!("{}: {}", path.display(), e)))?;
        self.cursor += 1;

        self.pace();
        let timestamp_ns = self.opened_at.elapsed().as_nanos() as u64;
        let frame = VideoFrame::from_rgb_image(img.to_rgb8(), timestamp_ns, self.sequence);
        self.sequence = self.sequence.wrapping_add(1);

        Ok(Some(frame))
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing frame directory after {} frames", self.sequence);
            self.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            let img = RgbImage::from_pixel(8, 6, Rgb([i as u8 * 40, 0, 0]));
            img.save(dir.join(name)).unwrap();
        }
    }

    #[test]
    fn test_replays_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["b.png", "a.png", "c.png"]);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = DirectorySource::open(dir.path(), false, 0).unwrap();
        assert_eq!(source.len(), 3);

        // a.png was written second, so its red channel is 40
        let first = source.read_frame().unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0), Some([40, 0, 0]));
        assert_eq!(first.sequence, 0);

        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_looping_rewinds() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["0.png", "1.png"]);

        let mut source = DirectorySource::open(dir.path(), true, 0).unwrap();
        for expected in 0..5u32 {
            let frame = source.read_frame().unwrap().unwrap();
            assert_eq!(frame.sequence, expected);
        }

        source.close();
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_empty_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            DirectorySource::open(dir.path(), false, 0),
            Err(CameraError::Open(_))
        ));
        assert!(DirectorySource::open(dir.path().join("missing"), false, 0).is_err());
    }
}
