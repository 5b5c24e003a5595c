//! Engine that records every request and completes utterances on demand

use crate::commands::Earcon;
use crate::engines::{EngineEvent, EngineSink, LanguageStatus, SynthesisEngine};
use crate::error::{Result, SpeechError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::debug;

/// One request received by a [`RecordingEngine`]
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    Initialize,
    Shutdown,
    AddEarcon(Earcon),
    SetLanguage(String),
    SetSpeechRate(f32),
    Speak { text: String, id: String },
    PlayEarcon { earcon: Earcon, id: String },
    PlaySilence { duration_ms: u32, id: String },
    Stop,
    Flush,
}

impl EngineCall {
    /// Utterance id of a queued request
    pub fn utterance_id(&self) -> Option<&str> {
        match self {
            EngineCall::Speak { id, .. }
            | EngineCall::PlayEarcon { id, .. }
            | EngineCall::PlaySilence { id, .. } => Some(id),
            _ => None,
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<EngineCall>,
    queue: VecDeque<EngineCall>,
    sink: Option<EngineSink>,
}

/// Engine double for hosts and tests. Nothing is spoken: requests are
/// recorded and queued, and the owner decides when utterances start and
/// finish with [`RecordingEngine::complete_next`].
pub struct RecordingEngine {
    state: Mutex<State>,
    accepted_locales: Option<Vec<String>>,
    init_outcome: std::result::Result<(), String>,
    report_init: bool,
    refuse_speech: Option<String>,
}

impl Default for RecordingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingEngine {
    /// Engine that accepts every locale and initializes successfully
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            accepted_locales: None,
            init_outcome: Ok(()),
            report_init: true,
            refuse_speech: None,
        }
    }

    /// Accept only these locale tags (matched case-insensitively)
    pub fn accepting(mut self, locales: &[&str]) -> Self {
        self.accepted_locales = Some(locales.iter().map(|l| l.to_ascii_lowercase()).collect());
        self
    }

    /// Report a failed initialization
    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_outcome = Err(message.into());
        self
    }

    /// Do not report initialization by itself; the owner calls
    /// [`RecordingEngine::finish_init`] later.
    pub fn deferred_init(mut self) -> Self {
        self.report_init = false;
        self
    }

    /// Fail every `speak` request with `message`
    pub fn refusing_speech(mut self, message: impl Into<String>) -> Self {
        self.refuse_speech = Some(message.into());
        self
    }

    pub fn finish_init(&self) {
        self.emit(EngineEvent::Initialized(self.init_outcome.clone()));
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Requests queued and not yet completed, oldest first
    pub fn queued(&self) -> Vec<EngineCall> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Text of every `speak` request so far
    pub fn spoken_texts(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                EngineCall::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Send any event, e.g. a late callback for an old utterance
    pub fn emit(&self, event: EngineEvent) {
        if let Some(sink) = self.state.lock().sink.as_ref() {
            let _ = sink.send(event);
        }
    }

    /// Report start and completion of the oldest queued request
    pub fn complete_next(&self) -> Option<EngineCall> {
        let (call, sink) = {
            let mut state = self.state.lock();
            let call = state.queue.pop_front()?;
            (call, state.sink.clone())
        };
        if let (Some(sink), Some(id)) = (sink, call.utterance_id()) {
            let _ = sink.send(EngineEvent::Started(id.to_string()));
            let _ = sink.send(EngineEvent::Done(id.to_string()));
        }
        Some(call)
    }

    /// Complete everything queued right now
    pub fn complete_all(&self) -> usize {
        let mut count = 0;
        while self.complete_next().is_some() {
            count += 1;
        }
        count
    }

    fn record(&self, call: EngineCall) {
        let mut state = self.state.lock();
        state.calls.push(call);
    }

    fn enqueue(&self, call: EngineCall) {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        state.queue.push_back(call);
    }
}

impl SynthesisEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    fn initialize(&self, sink: EngineSink) -> Result<()> {
        debug!("Recording engine initializing");
        {
            let mut state = self.state.lock();
            state.calls.push(EngineCall::Initialize);
            state.sink = Some(sink);
        }
        if self.report_init {
            self.finish_init();
        }
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Shutdown);
        state.queue.clear();
        state.sink = None;
    }

    fn add_earcon(&self, earcon: Earcon, _resource: &str) -> Result<()> {
        self.record(EngineCall::AddEarcon(earcon));
        Ok(())
    }

    fn set_language(&self, locale: &str) -> LanguageStatus {
        self.record(EngineCall::SetLanguage(locale.to_string()));
        match &self.accepted_locales {
            None => LanguageStatus::Available,
            Some(accepted) if accepted.iter().any(|l| l.eq_ignore_ascii_case(locale)) => {
                LanguageStatus::Available
            }
            Some(_) => LanguageStatus::NotSupported,
        }
    }

    fn set_speech_rate(&self, rate: f32) -> Result<()> {
        if !(rate > 0.0) {
            return Err(SpeechError::Engine(format!("invalid speech rate {}", rate)));
        }
        self.record(EngineCall::SetSpeechRate(rate));
        Ok(())
    }

    fn speak(&self, text: &str, utterance_id: &str) -> Result<()> {
        if let Some(message) = &self.refuse_speech {
            self.record(EngineCall::Speak {
                text: text.to_string(),
                id: utterance_id.to_string(),
            });
            return Err(SpeechError::Engine(message.clone()));
        }
        self.enqueue(EngineCall::Speak {
            text: text.to_string(),
            id: utterance_id.to_string(),
        });
        Ok(())
    }

    fn play_earcon(&self, earcon: Earcon, _volume: f32, utterance_id: &str) -> Result<()> {
        self.enqueue(EngineCall::PlayEarcon {
            earcon,
            id: utterance_id.to_string(),
        });
        Ok(())
    }

    fn play_silence(&self, duration_ms: u32, utterance_id: &str) -> Result<()> {
        self.enqueue(EngineCall::PlaySilence {
            duration_ms,
            id: utterance_id.to_string(),
        });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Stop);
        state.queue.clear();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(EngineCall::Flush);
        state.queue.clear();
        Ok(())
    }
}
