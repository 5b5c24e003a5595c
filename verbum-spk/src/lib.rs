//! verbum-spk: Speech orchestration for narrated scripture and documents
//!
//! Turns Bible verses or keyed document paragraphs into a stream of speak
//! commands and feeds them to a synthesis engine:
//! - Sentence aware batching with a chunk length limit
//! - Chapter, book and key change announcements
//! - Pause, resume across restarts, rewind and forward by unit
//! - Automatic "where was I" bookmarks

pub mod announce;
pub mod bookmarks;
pub mod commands;
pub mod config;
pub mod engines;
pub mod error;
pub mod events;
pub mod locale;
pub mod persist;
pub mod provider;
pub mod service;
pub mod source;
pub mod timing;

pub use announce::{Announcement, Announcer, ChapterAnnouncer, KeyAnnouncer, Transition};
pub use bookmarks::{Bookmark, BookmarkStore, BookmarkSync, Label, MemoryBookmarkStore, SPEAK_LABEL_NAME};
pub use commands::{CommandQueue, Earcon, SpeakCommand, TextCommand, TextKind};
pub use config::{Phrases, SpeakConfig, WraparoundPhrasing};
pub use engines::{
    engine_channel, ChunkId, EngineCall, EngineEvent, EngineSink, LanguageStatus, RecordingEngine, SimulatedEngine,
    SimulatedEngineConfig, SynthesisEngine,
};
pub use error::SpeechError;
pub use events::{EventBus, ProgressEvent, SpeakErrorKind, SpeakEvent, SpeakState};
pub use locale::{preference_list, LanguageSupport, Locale};
pub use provider::{
    BibleProvider, KeyProvider, KeyReading, ProviderContext, ProviderKind, SpeakProvider, SpeakTextProvider,
    UtteranceState, SHOW_ALL, SHOW_BOOK, SHOW_PERCENT,
};
pub use service::{EngineEvents, SpeakService};
pub use source::{BibleSource, BibleText, ContentSource, Heading, KeySource};
pub use timing::SpeakTiming;
