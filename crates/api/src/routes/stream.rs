//! Browser page and MJPEG stream

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};
use futures_util::stream;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::monitor::FrameSubscriber;
use crate::AppState;

/// Multipart boundary between JPEG parts
pub const BOUNDARY: &str = "frame";

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Driver Drowsiness Monitor</title>
  </head>
  <body style="background:#111;color:#eee;font-family:sans-serif;text-align:center">
    <h1>Driver Drowsiness Monitor</h1>
    <img src="/video_feed" alt="camera stream">
  </body>
</html>
"#;

/// Page embedding the stream
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// One multipart part carrying `jpeg`
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let head = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = Vec::with_capacity(head.len() + jpeg.len() + 4);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n\r\n");
    Bytes::from(part)
}

/// Counts a connected viewer until dropped
struct ViewerGuard(Arc<AtomicUsize>);

impl ViewerGuard {
    fn new(viewers: &Arc<AtomicUsize>) -> Self {
        viewers.fetch_add(1, Ordering::Relaxed);
        Self(Arc::clone(viewers))
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Next published frame; `None` once the frame loop has ended
async fn next_frame(frames: &mut FrameSubscriber) -> Option<Bytes> {
    loop {
        frames.changed().await.ok()?;
        let latest = frames.borrow_and_update().clone();
        if latest.is_some() {
            return latest;
        }
    }
}

/// Continuous `multipart/x-mixed-replace` stream of the latest frames.
///
/// Slow viewers skip frames rather than queueing them.
pub async fn video_feed(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let viewer = (state.frames.clone(), ViewerGuard::new(&state.viewers));
    info!("Viewer connected");

    let parts = stream::unfold(viewer, |(mut frames, guard)| async move {
        match next_frame(&mut frames).await {
            Some(jpeg) => Some((Ok::<_, Infallible>(multipart_part(&jpeg)), (frames, guard))),
            None => {
                debug!("Frame loop ended, closing viewer stream");
                None
            }
        }
    });

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(parts),
    )
}
