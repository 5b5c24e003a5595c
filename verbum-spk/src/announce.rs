//! Spoken announcements at book, chapter and key boundaries

use crate::commands::{Earcon, SpeakCommand};
use crate::config::{Phrases, SpeakConfig, WraparoundPhrasing};
use crate::source::Heading;
use verbum_core::{Boundary, PlaybackSettings, Unit};

/// How reading arrived at a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First unit after a start or a jump
    Fresh { container_start: bool },
    /// Natural progression from the previous unit
    Forward(Boundary),
    /// The previous unit comes later in reading order (wrap or loop)
    Backward(Boundary),
}

impl Transition {
    pub fn between<U: Unit>(previous: Option<&U>, next: &U) -> Self {
        match previous {
            None => Transition::Fresh {
                container_start: next.is_container_start(),
            },
            Some(previous) if next.ordinal() < previous.ordinal() => Transition::Backward(previous.boundary(next)),
            Some(previous) => Transition::Forward(previous.boundary(next)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    BookChanged,
    ContainerChanged,
    Jumped,
}

impl Announcement {
    /// Announcement to make for a transition, if any
    pub fn for_transition(transition: Transition, settings: &PlaybackSettings, config: &SpeakConfig) -> Option<Self> {
        let forward = |boundary: Boundary| match boundary {
            Boundary::BookChanged => Some(Announcement::BookChanged),
            Boundary::ContainerChanged if settings.speak_chapter_changes => Some(Announcement::ContainerChanged),
            _ => None,
        };

        match transition {
            Transition::Fresh { container_start } => {
                (container_start && settings.speak_chapter_changes).then_some(Announcement::Jumped)
            }
            Transition::Forward(boundary) => forward(boundary),
            Transition::Backward(boundary) => match config.wraparound_phrasing {
                WraparoundPhrasing::Forward => forward(boundary),
                WraparoundPhrasing::Backward => (boundary == Boundary::BookChanged
                    || settings.speak_chapter_changes)
                    .then_some(Announcement::Jumped),
            },
        }
    }
}

/// Phrasing strategy of one provider flavour
pub trait Announcer: Send + Sync {
    fn phrase(&self, announcement: Announcement, heading: &Heading, phrases: &Phrases) -> (Earcon, String);

    /// Earcon, phrase and a pause for the transition into `heading`
    fn announce(
        &self,
        transition: Transition,
        heading: &Heading,
        settings: &PlaybackSettings,
        config: &SpeakConfig,
    ) -> Vec<SpeakCommand> {
        match Announcement::for_transition(transition, settings, config) {
            Some(announcement) => {
                let (earcon, text) = self.phrase(announcement, heading, &config.phrases);
                vec![
                    SpeakCommand::earcon(earcon, true),
                    SpeakCommand::text(text),
                    SpeakCommand::silence_of(config.silence_ms),
                ]
            }
            None => Vec::new(),
        }
    }
}

/// "Book changed. Genesis Chapter 2." style announcements for Bibles
#[derive(Debug, Clone, Copy, Default)]
pub struct ChapterAnnouncer;

impl Announcer for ChapterAnnouncer {
    fn phrase(&self, announcement: Announcement, heading: &Heading, phrases: &Phrases) -> (Earcon, String) {
        let (earcon, template) = match announcement {
            Announcement::BookChanged => (Earcon::PreBookChange, &phrases.book_changed),
            Announcement::ContainerChanged => (Earcon::PreChapterChange, &phrases.chapter_changed),
            Announcement::Jumped => (Earcon::PreChapterChange, &phrases.jumped),
        };
        (
            earcon,
            Phrases::render(template, &heading.book, heading.container, &heading.key),
        )
    }
}

/// Key name announcements for keyed documents
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyAnnouncer;

impl Announcer for KeyAnnouncer {
    fn phrase(&self, announcement: Announcement, heading: &Heading, phrases: &Phrases) -> (Earcon, String) {
        let template = match announcement {
            Announcement::Jumped => &phrases.key_jumped,
            _ => &phrases.key_changed,
        };
        (
            Earcon::PreChapterChange,
            Phrases::render(template, &heading.book, heading.container, &heading.key),
        )
    }
}
