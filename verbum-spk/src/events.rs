//! Status and progress events published by the speech service

use crate::commands::SpeakCommand;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use verbum_core::PositionRange;

const EVENT_BUFFER_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakState {
    Silent,
    Speaking,
    Paused,
    /// Interrupted, e.g. by a phone call; resumes by itself
    TemporarilyStopped,
}

impl SpeakState {
    pub fn is_speaking(&self) -> bool {
        matches!(self, SpeakState::Speaking)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, SpeakState::Paused)
    }
}

/// What is being read right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Document id
    pub book: String,
    pub range: PositionRange,
    /// Chunk that started, `None` after a jump
    pub command: Option<SpeakCommand>,
    /// The host should scroll to the range even if the user moved away
    pub force_follow: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakErrorKind {
    EngineUnavailable,
    LanguageNotAvailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SpeakEvent {
    State { state: SpeakState },
    Progress(ProgressEvent),
    /// The host should drop any title or text shown for the old position
    ClearTitle,
    Error { kind: SpeakErrorKind, message: String },
}

/// Broadcast channel for speak events. Publishing never blocks and works
/// without subscribers or a runtime.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SpeakEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER_SIZE);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SpeakEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SpeakEvent) {
        trace!("Publishing {:?}", event);
        // no receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn state(&self, state: SpeakState) {
        self.publish(SpeakEvent::State { state });
    }

    pub fn progress(&self, progress: ProgressEvent) {
        self.publish(SpeakEvent::Progress(progress));
    }

    pub fn error(&self, kind: SpeakErrorKind, message: impl Into<String>) {
        self.publish(SpeakEvent::Error {
            kind,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.state(SpeakState::Speaking);
    }

    #[test]
    fn test_subscriber_receives_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.state(SpeakState::Speaking);
        bus.error(SpeakErrorKind::LanguageNotAvailable, "fi");
        assert_eq!(rx.try_recv().unwrap(), SpeakEvent::State { state: SpeakState::Speaking });
        assert!(matches!(
            rx.try_recv().unwrap(),
            SpeakEvent::Error { kind: SpeakErrorKind::LanguageNotAvailable, .. }
        ));
    }
}
