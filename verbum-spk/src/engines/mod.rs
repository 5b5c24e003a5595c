//! Synthesis engine contract and bundled engines

pub mod recording;
pub mod simulated;

use crate::commands::Earcon;
use crate::error::Result;
use std::fmt;
use tokio::sync::mpsc;

pub use recording::{EngineCall, RecordingEngine};
pub use simulated::{SimulatedEngine, SimulatedEngineConfig};

/// Outcome of a language change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageStatus {
    Available,
    MissingData,
    NotSupported,
}

/// Callback from the engine. Utterance ids are the strings the engine was
/// given with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Asynchronous completion of `initialize`
    Initialized(std::result::Result<(), String>),
    Started(String),
    Done(String),
    Error(String),
}

/// Channel the engine reports events through
pub type EngineSink = mpsc::UnboundedSender<EngineEvent>;

/// A speech engine that queues utterances and reports their progress
/// asynchronously. Requests are queued in order; `flush` and `stop` discard
/// everything queued so far.
pub trait SynthesisEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Start the engine. Completion is reported as `EngineEvent::Initialized`
    /// through `sink`, which also receives every later event.
    fn initialize(&self, sink: EngineSink) -> Result<()>;

    /// Release the engine. A new `initialize` is needed before speaking again.
    fn shutdown(&self);

    fn add_earcon(&self, earcon: Earcon, resource: &str) -> Result<()>;

    fn set_language(&self, locale: &str) -> LanguageStatus;

    /// 1.0 is normal speed
    fn set_speech_rate(&self, rate: f32) -> Result<()>;

    fn speak(&self, text: &str, utterance_id: &str) -> Result<()>;

    fn play_earcon(&self, earcon: Earcon, volume: f32, utterance_id: &str) -> Result<()>;

    fn play_silence(&self, duration_ms: u32, utterance_id: &str) -> Result<()>;

    /// Stop the current utterance and drop the queue
    fn stop(&self) -> Result<()>;

    /// Drop queued utterances that have not started yet
    fn flush(&self) -> Result<()>;

    /// Longest text `speak` accepts
    fn max_input_length(&self) -> Option<usize> {
        None
    }
}

/// Identity of one chunk handed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkId {
    pub generation: u64,
    pub seq: u64,
}

impl ChunkId {
    pub fn new(generation: u64, seq: u64) -> Self {
        Self { generation, seq }
    }

    /// Engine utterance id: `<prefix><generation>-<seq>`
    pub fn utterance_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self)
    }

    /// Parse an utterance id produced by `utterance_id`. Ids from other
    /// sources yield `None`.
    pub fn parse(prefix: &str, utterance_id: &str) -> Option<Self> {
        let rest = utterance_id.strip_prefix(prefix)?;
        let (generation, seq) = rest.split_once('-')?;
        Some(Self {
            generation: generation.parse().ok()?,
            seq: seq.parse().ok()?,
        })
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.seq)
    }
}

/// Create the channel an engine reports through
pub fn engine_channel() -> (EngineSink, mpsc::UnboundedReceiver<EngineEvent>) {
    mpsc::unbounded_channel()
}
