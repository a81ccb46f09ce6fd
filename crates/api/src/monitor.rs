//! Frame loop
//!
//! One dedicated thread pulls frames, analyzes them, sounds alerts, draws
//! overlays and publishes the encoded JPEG to every viewer. The loop ends
//! when the frame sequence ends; dropping the publisher then ends every
//! open stream.

use alerting::{AlertDispatcher, AlertKind, AlertSummary};
use axum::body::Bytes;
use camera_capture::{FrameSource, Frames, VideoFrame};
use dms::{DmsAnalysis, DmsModule, EyePair};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::render::{encode_jpeg, render_overlay};
use crate::ApiError;

/// Latest encoded frame, `None` until the first frame is published
pub type FramePublisher = watch::Sender<Option<Bytes>>;
pub type FrameSubscriber = watch::Receiver<Option<Bytes>>;

/// Snapshot of the frame loop for the status endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub frames_processed: u64,
    pub frames_failed: u64,
    pub last_sequence: Option<u32>,
    pub face_detected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eyes: Option<EyePair>,
    pub face_absent_s: f64,
    pub eyes_timer_s: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_alert: Option<AlertKind>,
    pub alerts: BTreeMap<&'static str, AlertSummary>,
}

pub type SharedStatus = Arc<RwLock<MonitorStatus>>;

/// Frame loop configuration
#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    pub frame_scale: f32,
    pub jpeg_quality: u8,
}

pub struct Monitor<S: FrameSource> {
    frames: Frames<S>,
    dms: DmsModule,
    dispatcher: AlertDispatcher,
    options: LoopOptions,
    publisher: FramePublisher,
    status: SharedStatus,
}

impl<S: FrameSource + 'static> Monitor<S> {
    pub fn new(
        frames: Frames<S>,
        dms: DmsModule,
        dispatcher: AlertDispatcher,
        options: LoopOptions,
        publisher: FramePublisher,
        status: SharedStatus,
    ) -> Self {
        Self {
            frames,
            dms,
            dispatcher,
            options,
            publisher,
            status,
        }
    }

    /// Run the loop on its own thread
    pub fn spawn(self) -> Result<JoinHandle<()>, ApiError> {
        let handle = thread::Builder::new()
            .name("frame-loop".into())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Run until the frame sequence ends
    pub fn run(mut self) {
        let session_start = Instant::now();
        self.dms.reset_state(Duration::ZERO);
        self.dispatcher.clear();
        self.status.blocking_write().running = true;
        info!("Frame loop started");

        while let Some(frame) = self.frames.next() {
            let started = Instant::now();
            let now = session_start.elapsed();

            match self.process_frame(&frame, now) {
                Ok((jpeg, analysis)) => {
                    self.publisher.send_replace(Some(jpeg));
                    self.record(analysis.as_ref());
                }
                Err(e) => {
                    warn!("Frame {} dropped: {}", frame.sequence, e);
                    self.status.blocking_write().frames_failed += 1;
                }
            }
            histogram!("frame_latency_seconds").record(started.elapsed().as_secs_f64());
        }

        self.status.blocking_write().running = false;
        info!(
            "Frame loop finished after {} frames",
            self.frames.delivered()
        );
    }

    /// Analyze one frame and produce the JPEG to publish.
    ///
    /// A frame that cannot be analyzed is still encoded, without overlays.
    fn process_frame(
        &mut self,
        frame: &VideoFrame,
        now: Duration,
    ) -> Result<(Bytes, Option<DmsAnalysis>), ApiError> {
        let frame = if (self.options.frame_scale - 1.0).abs() > f32::EPSILON {
            frame.scale(self.options.frame_scale)?
        } else {
            frame.clone()
        };
        let mut img = frame.to_rgb_image()?;

        let analysis = match self.dms.analyze(&frame, now) {
            Ok(analysis) => {
                if let Some(kind) = analysis.alert {
                    if self.dispatcher.dispatch(kind, frame.sequence) {
                        counter!("alerts_fired_total", "kind" => kind.as_str()).increment(1);
                    }
                }
                render_overlay(&mut img, &analysis);
                Some(analysis)
            }
            Err(e) => {
                warn!("Frame {} not analyzed: {}", frame.sequence, e);
                None
            }
        };

        let jpeg = encode_jpeg(&img, self.options.jpeg_quality)?;
        counter!("frames_processed_total").increment(1);
        debug!("Frame {} encoded ({} bytes)", frame.sequence, jpeg.len());
        Ok((Bytes::from(jpeg), analysis))
    }

    fn record(&self, analysis: Option<&DmsAnalysis>) {
        let mut status = self.status.blocking_write();
        status.frames_processed += 1;
        // Ages are relative to now, refresh them even between alerts
        status.alerts = self.dispatcher.summary();

        let Some(analysis) = analysis else {
            status.frames_failed += 1;
            return;
        };
        counter!("faces_detected_total").increment(analysis.faces.len() as u64);

        status.last_sequence = Some(analysis.sequence);
        status.face_detected = analysis.face_detected;
        status.eyes = analysis.primary_eyes().copied();
        status.face_absent_s = analysis.face_absent_s;
        status.eyes_timer_s = analysis.eyes_timer_s;
        if analysis.alert.is_some() {
            status.last_alert = analysis.alert;
        }
    }
}
