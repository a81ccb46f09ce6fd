//! Alert tone sinks

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tone parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneConfig {
    /// Tone frequency (default: 2500 Hz)
    pub frequency_hz: u32,
    /// Tone length (default: 100 ms)
    pub duration_ms: u64,
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 2500,
            duration_ms: 100,
        }
    }
}

impl ToneConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Something that can sound the alert.
///
/// Fire-and-forget: implementations must return promptly.
pub trait AlertSink: Send + Sync {
    fn emit_alert_tone(&self);
}

impl<S: AlertSink + ?Sized> AlertSink for Arc<S> {
    fn emit_alert_tone(&self) {
        (**self).emit_alert_tone()
    }
}

/// Rings the terminal bell on a background thread.
///
/// A tone requested while the previous one is still sounding is dropped.
pub struct BellSink {
    tone: ToneConfig,
    sounding: Arc<AtomicBool>,
}

impl BellSink {
    pub fn new(tone: ToneConfig) -> Self {
        info!(
            "Alert tone: {} Hz for {} ms",
            tone.frequency_hz, tone.duration_ms
        );
        Self {
            tone,
            sounding: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn tone(&self) -> &ToneConfig {
        &self.tone
    }
}

impl AlertSink for BellSink {
    fn emit_alert_tone(&self) {
        if self.sounding.swap(true, Ordering::AcqRel) {
            debug!("Alert tone already sounding");
            return;
        }

        let sounding = Arc::clone(&self.sounding);
        let duration = self.tone.duration();
        let spawned = thread::Builder::new()
            .name("alert-tone".into())
            .spawn(move || {
                let mut stderr = std::io::stderr();
                if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
                    warn!("Failed to ring bell: {}", e);
                }
                thread::sleep(duration);
                sounding.store(false, Ordering::Release);
            });

        if let Err(e) = spawned {
            warn!("Failed to start alert tone thread: {}", e);
            self.sounding.store(false, Ordering::Release);
        }
    }
}

/// Discards every tone
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn emit_alert_tone(&self) {}
}

/// Counts tones instead of playing them
#[derive(Debug, Default)]
pub struct RecordingSink {
    emitted: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::Relaxed)
    }
}

impl AlertSink for RecordingSink {
    fn emit_alert_tone(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tone_defaults() {
        let tone = ToneConfig::default();
        assert_eq!(tone.frequency_hz, 2500);
        assert_eq!(tone.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_tone_config() {
        let tone: ToneConfig = serde_json::from_str(r#"{"duration_ms": 250}"#).unwrap();
        assert_eq!(tone.frequency_hz, 2500);
        assert_eq!(tone.duration_ms, 250);
    }

    #[test]
    fn test_recording_sink_through_arc() {
        let sink = Arc::new(RecordingSink::new());
        let shared: Arc<dyn AlertSink> = sink.clone();
        shared.emit_alert_tone();
        shared.emit_alert_tone();
        assert_eq!(sink.emitted(), 2);
    }

    #[test]
    fn test_bell_sink_returns_immediately() {
        let sink = BellSink::new(ToneConfig {
            duration_ms: 200,
            ..Default::default()
        });
        let start = std::time::Instant::now();
        sink.emit_alert_tone();
        sink.emit_alert_tone();
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
