//! MJPEG byte stream source
//!
//! Frames are concatenated baseline or progressive JPEGs. Frame boundaries are
//! found by walking the JPEG marker structure rather than searching for the
//! first `FF D9`, so embedded thumbnails do not split a frame.

use std::fs::File;
use std::io::{self, BufReader, ErrorKind, Read};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::frame::{decode_jpeg, VideoFrame};
use crate::source::FrameSource;
use crate::CameraError;

/// Upper bound on a single encoded frame
const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const TEM: u8 = 0x01;

fn is_rst(marker: u8) -> bool {
    (0xD0..=0xD7).contains(&marker)
}

/// Splits a byte stream into complete JPEG images
pub struct JpegSplitter<R> {
    reader: BufReader<R>,
}

impl<R: Read> JpegSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    fn byte(&mut self) -> io::Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.reader.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(b[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Read the next complete JPEG. `Ok(None)` at end of stream; a frame cut
    /// short by end of stream is discarded.
    pub fn next_jpeg(&mut self) -> Result<Option<Vec<u8>>, CameraError> {
        let io_err = |e: io::Error| CameraError::Stream(e.to_string());

        // Skip anything before the start-of-image marker
        let mut prev = 0u8;
        loop {
            match self.byte().map_err(io_err)? {
                None => return Ok(None),
                Some(SOI) if prev == 0xFF => break,
                Some(b) => prev = b,
            }
        }

        let mut buf = vec![0xFF, SOI];
        let mut pending: Option<u8> = None;

        loop {
            let marker = match pending.take() {
                Some(m) => m,
                None => {
                    match self.byte().map_err(io_err)? {
                        Some(0xFF) => {}
                        Some(b) => {
                            return Err(CameraError::Format(format!(
                                "expected marker, found byte {:#04x}",
                                b
                            )))
                        }
                        None => return Ok(self.truncated(buf.len())),
                    }
                    match self.skip_fill().map_err(io_err)? {
                        Some(m) => m,
                        None => return Ok(self.truncated(buf.len())),
                    }
                }
            };

            buf.extend_from_slice(&[0xFF, marker]);

            if marker == EOI {
                return Ok(Some(buf));
            }
            if is_rst(marker) || marker == TEM {
                continue;
            }

            // Length-prefixed segment
            let (Some(hi), Some(lo)) = (self.byte().map_err(io_err)?, self.byte().map_err(io_err)?)
            else {
                return Ok(self.truncated(buf.len()));
            };
            let len = u16::from_be_bytes([hi, lo]) as usize;
            if len < 2 {
                return Err(CameraError::Format(format!("segment length {} too short", len)));
            }
            buf.extend_from_slice(&[hi, lo]);
            let start = buf.len();
            buf.resize(start + len - 2, 0);
            if let Err(e) = self.reader.read_exact(&mut buf[start..]) {
                if e.kind() == ErrorKind::UnexpectedEof {
                    return Ok(self.truncated(start));
                }
                return Err(io_err(e));
            }

            if marker == SOS {
                pending = self.scan_entropy(&mut buf).map_err(io_err)?;
                if pending.is_none() {
                    return Ok(self.truncated(buf.len()));
                }
            }

            if buf.len() > MAX_FRAME_BYTES {
                return Err(CameraError::Format(format!(
                    "frame exceeds {} bytes",
                    MAX_FRAME_BYTES
                )));
            }
        }
    }

    /// Consume fill bytes after an `FF`, returning the marker code
    fn skip_fill(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.byte()? {
                Some(0xFF) => continue,
                other => return Ok(other),
            }
        }
    }

    /// Copy entropy-coded data into `buf`, returning the marker that ends it
    fn scan_entropy(&mut self, buf: &mut Vec<u8>) -> io::Result<Option<u8>> {
        loop {
            let Some(b) = self.byte()? else {
                return Ok(None);
            };
            if b != 0xFF {
                buf.push(b);
                continue;
            }
            let Some(next) = self.skip_fill()? else {
                return Ok(None);
            };
            if next == 0x00 || is_rst(next) {
                buf.extend_from_slice(&[0xFF, next]);
                continue;
            }
            return Ok(Some(next));
        }
    }

    fn truncated(&self, bytes: usize) -> Option<Vec<u8>> {
        warn!("MJPEG stream ended inside a frame, dropping {} bytes", bytes);
        None
    }
}

/// Frame source reading concatenated JPEGs from a file, FIFO or stdin
pub struct MjpegSource {
    splitter: Option<JpegSplitter<Box<dyn Read + Send>>>,
    opened_at: Instant,
    sequence: u32,
}

impl MjpegSource {
    /// Open a stream path; `-` reads standard input
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let reader: Box<dyn Read + Send> = if path == Path::new("-") {
            info!("Reading MJPEG frames from stdin");
            Box::new(io::stdin())
        } else {
            info!("Reading MJPEG frames from {}", path.display());
            Box::new(
                File::open(path)
                    .map_err(|e| CameraError::Open(format!("{}: {}", path.display(), e)))?,
            )
        };
        Ok(Self::from_reader(reader))
    }

    /// Wrap any byte reader
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self {
            splitter: Some(JpegSplitter::new(reader)),
            opened_at: Instant::now(),
            sequence: 0,
        }
    }
}

impl FrameSource for MjpegSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(splitter) = self.splitter.as_mut() else {
            return Ok(None);
        };
        let Some(jpeg) = splitter.next_jpeg()? else {
            return Ok(None);
        };

        let frame = decode_jpeg(
            &jpeg,
            self.opened_at.elapsed().as_nanos() as u64,
            self.sequence,
        )?;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.splitter.take().is_some() {
            debug!("Closed MJPEG stream after {} frames", self.sequence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(shade: u8) -> Vec<u8> {
        let img = RgbImage::from_pixel(24, 16, Rgb([shade, shade, shade]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 90)
            .encode_image(&img)
            .unwrap();
        jpeg
    }

    #[test]
    fn test_splits_concatenated_frames() {
        let a = encode(30);
        let b = encode(200);
        let mut stream = b"garbage".to_vec();
        stream.extend_from_slice(&a);
        stream.extend_from_slice(&b);

        let mut splitter = JpegSplitter::new(Cursor::new(stream));
        assert_eq!(splitter.next_jpeg().unwrap().unwrap(), a);
        assert_eq!(splitter.next_jpeg().unwrap().unwrap(), b);
        assert!(splitter.next_jpeg().unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame_ends_stream() {
        let a = encode(90);
        let mut stream = a.clone();
        stream.extend_from_slice(&a[..a.len() / 2]);

        let mut splitter = JpegSplitter::new(Cursor::new(stream));
        assert!(splitter.next_jpeg().unwrap().is_some());
        assert!(splitter.next_jpeg().unwrap().is_none());
    }

    #[test]
    fn test_app_segment_with_embedded_eoi() {
        // APP1 payload carrying a fake EOI must not end the frame
        let a = encode(60);
        let mut frame = vec![0xFF, SOI, 0xFF, 0xE1, 0x00, 0x06, 0xFF, 0xD9, 0xAB, 0xCD];
        frame.extend_from_slice(&a[2..]);

        let mut splitter = JpegSplitter::new(Cursor::new(frame.clone()));
        assert_eq!(splitter.next_jpeg().unwrap().unwrap(), frame);
    }

    #[test]
    fn test_source_decodes_and_closes() {
        let mut stream = encode(10);
        stream.extend_from_slice(&encode(250));

        let mut source = MjpegSource::from_reader(Box::new(Cursor::new(stream)));
        let first = source.read_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height, first.sequence), (24, 16, 0));

        source.close();
        assert!(source.read_frame().unwrap().is_none());
    }
}
