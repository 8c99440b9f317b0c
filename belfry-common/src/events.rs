//! Event system for belfry
//!
//! One-to-many broadcasting over `tokio::broadcast`: the engine and scheduler
//! emit, the SSE stream (and tests) subscribe. Emission is non-blocking and
//! lossy-by-choice: components that nobody listens to keep working.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Which output lane an audio event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    Bell,
    Announcement,
    Music,
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelId::Bell => write!(f, "bell"),
            ChannelId::Announcement => write!(f, "announcement"),
            ChannelId::Music => write!(f, "music"),
        }
    }
}

/// Belfry event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BelfryEvent {
    /// Scheduler thread started
    SchedulerStarted {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Scheduler thread stopped
    SchedulerStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A scheduled activity began
    ActivityStarted {
        activity_id: String,
        name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A scheduled activity ended
    ActivityEnded {
        activity_id: String,
        name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A bell began playing
    BellStarted {
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A bell finished playing (blocking play only)
    BellEnded {
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An announcement began playing
    AnnouncementStarted {
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background music started
    MusicStarted {
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Background music stopped
    MusicStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A lane failed to play a source (backend error or dead stream)
    ChannelError {
        channel: ChannelId,
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A channel volume changed
    VolumeChanged {
        channel: ChannelId,
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The weekly schedule was mutated
    ScheduleUpdated {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A birthday announcement fired
    BirthdayAnnounced {
        name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl BelfryEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            BelfryEvent::SchedulerStarted { .. } => "SchedulerStarted",
            BelfryEvent::SchedulerStopped { .. } => "SchedulerStopped",
            BelfryEvent::ActivityStarted { .. } => "ActivityStarted",
            BelfryEvent::ActivityEnded { .. } => "ActivityEnded",
            BelfryEvent::BellStarted { .. } => "BellStarted",
            BelfryEvent::BellEnded { .. } => "BellEnded",
            BelfryEvent::AnnouncementStarted { .. } => "AnnouncementStarted",
            BelfryEvent::MusicStarted { .. } => "MusicStarted",
            BelfryEvent::MusicStopped { .. } => "MusicStopped",
            BelfryEvent::ChannelError { .. } => "ChannelError",
            BelfryEvent::VolumeChanged { .. } => "VolumeChanged",
            BelfryEvent::ScheduleUpdated { .. } => "ScheduleUpdated",
            BelfryEvent::BirthdayAnnounced { .. } => "BirthdayAnnounced",
        }
    }
}

/// Broadcast bus for [`BelfryEvent`].
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BelfryEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<BelfryEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening.
    pub fn emit(&self, event: BelfryEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_tracks_receiver_count() {
        let bus = EventBus::new(100);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn emitted_events_reach_subscribers() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        bus.emit(BelfryEvent::BellStarted {
            source: "bell1.mp3".to_string(),
            timestamp: chrono::Utc::now(),
        });

        match rx.recv().await.unwrap() {
            BelfryEvent::BellStarted { source, .. } => assert_eq!(source, "bell1.mp3"),
            other => panic!("wrong event: {:?}", other),
        }
    }

    #[test]
    fn emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(10);
        bus.emit(BelfryEvent::MusicStopped {
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = BelfryEvent::ChannelError {
            channel: ChannelId::Music,
            source: "http://radio.example/stream".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ChannelError\""));
        assert!(json.contains("\"channel\":\"music\""));
        assert_eq!(event.event_type(), "ChannelError");
    }
}
