//! Alert timer state machine
//!
//! Two independent hysteresis timers turn noisy per-frame detections into
//! alert decisions. Time is the monotonic offset since the streaming session
//! started; the state is a plain value threaded through [`AlertTimers::step`].

use alerting::AlertKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::{AlertConfig, EyesTimerReset};

/// Openness scores of one face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeScores {
    pub left: f32,
    pub right: f32,
}

impl EyeScores {
    pub fn new(left: f32, right: f32) -> Self {
        Self { left, right }
    }

    /// Both eyes at or below the closed threshold
    pub fn both_closed(&self, threshold: f32) -> bool {
        self.left <= threshold && self.right <= threshold
    }
}

/// Overlay label for one eye (display only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EyeLabel {
    Open,
    Close,
}

impl EyeLabel {
    pub fn from_score(score: f32, threshold: f32) -> Self {
        if score > threshold {
            EyeLabel::Open
        } else {
            EyeLabel::Close
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EyeLabel::Open => "Open",
            EyeLabel::Close => "Close",
        }
    }
}

/// What one frame contributed to the alert logic
#[derive(Debug, Clone, PartialEq)]
pub enum FrameObservation {
    /// The localizer found nothing
    NoFace,
    /// One entry per detected face; `None` when the eyes could not be scored
    Faces(Vec<Option<EyeScores>>),
}

/// Timer origins carried from frame to frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTimers {
    /// Last frame in which a face was present
    pub last_face_seen: Duration,
    /// Origin of the eyes-closed timer
    pub eyes_timer_origin: Duration,
}

impl AlertTimers {
    /// Both timers start at the beginning of the session
    pub fn started_at(now: Duration) -> Self {
        Self {
            last_face_seen: now,
            eyes_timer_origin: now,
        }
    }

    pub fn face_absent_for(&self, now: Duration) -> Duration {
        now.saturating_sub(self.last_face_seen)
    }

    pub fn eyes_timer(&self, now: Duration) -> Duration {
        now.saturating_sub(self.eyes_timer_origin)
    }

    /// Advance the timers by one frame.
    ///
    /// Returns the new timers and at most one alert for this frame.
    pub fn step(
        self,
        observation: &FrameObservation,
        now: Duration,
        config: &AlertConfig,
    ) -> (AlertTimers, Option<AlertKind>) {
        let mut next = self;

        match observation {
            FrameObservation::NoFace => {
                // The face-loss origin is left alone, so the alert repeats
                // on every faceless frame past the delay.
                if next.face_absent_for(now) >= config.face_loss_delay() {
                    if config.face_loss_resets_eyes_timer {
                        next.eyes_timer_origin = now;
                    }
                    return (next, Some(AlertKind::FaceLoss));
                }
                (next, None)
            }
            FrameObservation::Faces(faces) => {
                next.last_face_seen = now;

                for scores in faces.iter().flatten() {
                    if scores.both_closed(config.eyes_closed_threshold) {
                        if next.eyes_timer(now) >= config.eyes_closed_delay() {
                            next.eyes_timer_origin = now;
                            return (next, Some(AlertKind::EyesClosed));
                        }
                    } else if config.eyes_timer_reset == EyesTimerReset::OnOpenEyes {
                        next.eyes_timer_origin = now;
                    }
                }
                (next, None)
            }
        }
    }
}
