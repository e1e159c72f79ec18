//! Typed progress events on a bounded channel.
//!
//! The orchestrator publishes; the caller consumes at its own pace. The
//! channel is bounded and publication uses `try_send`, so a slow or absent
//! consumer can only ever cost dropped events, never a blocked compute
//! thread.

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;

/// Default capacity of a bounded progress channel.
pub const DEFAULT_CAPACITY: usize = 64;

/// Progress notifications emitted while a panel is optimized.
///
/// Zone events arrive in BFS order; root events precede every zone event of
/// the same attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Root optimization started.
    RootStarted {
        /// Retry attempt, starting at 0.
        attempt: usize,
        /// Root zone index.
        zone: usize,
    },
    /// Root optimization finished.
    RootCompleted {
        /// Retry attempt, starting at 0.
        attempt: usize,
        /// Root zone index.
        zone: usize,
        /// Root fitness.
        fitness: f64,
    },
    /// Drop-off derivation of one zone started.
    ZoneStarted {
        /// Zone index.
        zone: usize,
        /// Parent zone the sequence is derived from.
        parent: usize,
    },
    /// A zone's sequence is final.
    ZoneCompleted {
        /// Zone index.
        zone: usize,
        /// Zone fitness after polish.
        fitness: f64,
    },
    /// A drop-off failed and the root will be re-optimized.
    RetryScheduled {
        /// The attempt that just failed, starting at 0.
        attempt: usize,
        /// Zone whose drop-off failed.
        zone: usize,
    },
}

/// Publishing side of a progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Sender<ProgressEvent>,
}

impl ProgressSink {
    /// Wraps an existing bounded sender.
    #[must_use]
    pub const fn new(sender: Sender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both ends.
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = bounded(capacity);
        (Self::new(sender), receiver)
    }

    /// Publishes without blocking; events are dropped when the buffer is
    /// full or the receiver is gone.
    pub(crate) fn publish(&self, event: ProgressEvent) {
        if let Err(err) = self.sender.try_send(event) {
            log::trace!("progress event dropped: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_publish_order() {
        let (sink, receiver) = ProgressSink::bounded(8);
        sink.publish(ProgressEvent::RootStarted { attempt: 0, zone: 0 });
        sink.publish(ProgressEvent::RootCompleted {
            attempt: 0,
            zone: 0,
            fitness: 92.5,
        });
        drop(sink);
        let events: Vec<ProgressEvent> = receiver.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ProgressEvent::RootStarted { attempt: 0, zone: 0 });
    }

    #[test]
    fn test_overflow_drops_instead_of_blocking() {
        let (sink, receiver) = ProgressSink::bounded(1);
        sink.publish(ProgressEvent::ZoneStarted { zone: 1, parent: 0 });
        // Buffer full: this one is dropped, the call returns immediately.
        sink.publish(ProgressEvent::ZoneCompleted { zone: 1, fitness: 90.0 });
        drop(sink);
        let events: Vec<ProgressEvent> = receiver.iter().collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json =
            serde_json::to_value(ProgressEvent::ZoneCompleted { zone: 2, fitness: 88.25 })
                .unwrap();
        assert_eq!(json["type"], "zone_completed");
        assert_eq!(json["zone"], 2);
    }
}
