//! Alert dispatch and bookkeeping

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::sink::AlertSink;
use crate::AlertKind;

/// State of one alert kind for the current session
#[derive(Debug, Clone)]
pub struct AlertState {
    /// Last time this alert was fired
    pub last_fired: Instant,
    /// Number of times fired
    pub fire_count: usize,
    /// Frame on which it last fired
    pub last_sequence: u32,
}

/// Per-kind summary for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub fire_count: usize,
    /// Seconds since the alert last fired
    pub last_fired_s_ago: f64,
}

/// Sounds alerts and keeps in-memory counts for the session
pub struct AlertDispatcher {
    sink: Box<dyn AlertSink>,
    states: BTreeMap<AlertKind, AlertState>,
}

impl AlertDispatcher {
    pub fn new(sink: Box<dyn AlertSink>) -> Self {
        Self {
            sink,
            states: BTreeMap::new(),
        }
    }

    /// Sound `kind` for frame `sequence`.
    ///
    /// Returns false if this kind already fired for the same frame.
    pub fn dispatch(&mut self, kind: AlertKind, sequence: u32) -> bool {
        if let Some(state) = self.states.get(&kind) {
            if state.fire_count > 0 && state.last_sequence == sequence {
                debug!("Alert suppressed: {} already fired on frame {}", kind, sequence);
                return false;
            }
        }

        self.sink.emit_alert_tone();

        let now = Instant::now();
        let state = self.states.entry(kind).or_insert(AlertState {
            last_fired: now,
            fire_count: 0,
            last_sequence: sequence,
        });
        state.last_fired = now;
        state.last_sequence = sequence;
        state.fire_count += 1;

        warn!("Alert fired: {} on frame {} (count: {})", kind, sequence, state.fire_count);
        true
    }

    pub fn state(&self, kind: AlertKind) -> Option<&AlertState> {
        self.states.get(&kind)
    }

    pub fn fire_count(&self, kind: AlertKind) -> usize {
        self.states.get(&kind).map_or(0, |s| s.fire_count)
    }

    /// Total alerts this session
    pub fn total(&self) -> usize {
        self.states.values().map(|s| s.fire_count).sum()
    }

    /// Summary keyed by alert name
    pub fn summary(&self) -> BTreeMap<&'static str, AlertSummary> {
        self.states
            .iter()
            .map(|(kind, state)| {
                (
                    kind.as_str(),
                    AlertSummary {
                        fire_count: state.fire_count,
                        last_fired_s_ago: state.last_fired.elapsed().as_secs_f64(),
                    },
                )
            })
            .collect()
    }

    /// Forget all alert states (new session)
    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::RecordingSink;
    use std::sync::Arc;

    fn dispatcher() -> (AlertDispatcher, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        (AlertDispatcher::new(Box::new(sink.clone())), sink)
    }

    #[test]
    fn test_once_per_frame_per_kind() {
        let (mut dispatcher, sink) = dispatcher();

        assert!(dispatcher.dispatch(AlertKind::EyesClosed, 7));
        assert!(!dispatcher.dispatch(AlertKind::EyesClosed, 7));
        assert!(dispatcher.dispatch(AlertKind::FaceLoss, 7));

        assert_eq!(sink.emitted(), 2);
        assert_eq!(dispatcher.fire_count(AlertKind::EyesClosed), 1);
    }

    #[test]
    fn test_repeats_on_later_frames() {
        let (mut dispatcher, sink) = dispatcher();

        for seq in 30..33 {
            assert!(dispatcher.dispatch(AlertKind::FaceLoss, seq));
        }
        assert_eq!(sink.emitted(), 3);
        assert_eq!(dispatcher.total(), 3);
        assert_eq!(dispatcher.state(AlertKind::FaceLoss).unwrap().last_sequence, 32);
    }

    #[test]
    fn test_summary_and_clear() {
        let (mut dispatcher, _) = dispatcher();
        dispatcher.dispatch(AlertKind::EyesClosed, 1);

        let summary = dispatcher.summary();
        assert_eq!(summary["eyes_closed"].fire_count, 1);
        assert!(!summary.contains_key("face_loss"));

        dispatcher.clear();
        assert_eq!(dispatcher.total(), 0);
        assert!(dispatcher.dispatch(AlertKind::EyesClosed, 1));
    }
}
