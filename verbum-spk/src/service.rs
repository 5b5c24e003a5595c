//! Playback orchestration
//!
//! [`SpeakService`] owns the playback state machine and the synthesis
//! engine. Every chunk handed to the engine carries a [`ChunkId`] with the
//! current generation; navigation bumps the generation so callbacks for
//! chunks of an older generation are recognized and dropped. All state sits
//! behind one mutex, and engine callbacks arrive through a channel, so a
//! callback never runs while a navigation call holds the lock.

use crate::commands::{Earcon, SpeakCommand};
use crate::config::SpeakConfig;
use crate::engines::{engine_channel, ChunkId, EngineEvent, EngineSink, LanguageStatus, SynthesisEngine};
use crate::error::{Result, SpeechError};
use crate::events::{EventBus, SpeakErrorKind, SpeakEvent, SpeakState};
use crate::locale::{preference_list, LanguageSupport, Locale};
use crate::persist::{SPEAK_KEY_DOCUMENT, SPEAK_LOCALE, SPEAK_PROVIDER};
use crate::provider::{
    BibleProvider, KeyProvider, KeyReading, ProviderContext, ProviderKind, SpeakTextProvider,
};
use crate::source::BibleSource;
use crate::bookmarks::BookmarkStore;
use crate::timing::SpeakTiming;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};
use verbum_core::{KeyDocument, KeyValueStore, Position, RewindAmount, SharedSettings, SpeakSettings, VerseRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Released,
    Initializing,
    Ready,
}

struct Inner {
    engine: Arc<dyn SynthesisEngine>,
    engine_state: EngineState,
    /// Start speaking once the engine reports it is initialized
    pending_start: bool,
    sink: EngineSink,

    config: Arc<SpeakConfig>,
    settings: SharedSettings,
    store: Arc<dyn KeyValueStore>,
    context: ProviderContext,
    events: EventBus,

    bible: BibleProvider,
    keys: Option<KeyProvider>,
    active: ProviderKind,

    state: SpeakState,
    generation: u64,
    next_seq: u64,
    /// Last chunk handed out in the current generation
    last_chunk: Option<ChunkId>,

    timing: SpeakTiming,
    language_support: LanguageSupport,
    system_locale: Locale,
    current_locale: Option<Locale>,
    /// Paused by an interruption and resumes when it ends
    interrupted: bool,
}

/// Handle to the speech orchestrator. Cheap to clone; all clones drive the
/// same playback.
#[derive(Clone)]
pub struct SpeakService {
    inner: Arc<Mutex<Inner>>,
    events: EventBus,
}

/// Receiving end of the engine callbacks. The host either drains it after
/// driving the engine or runs it on a tokio task.
pub struct EngineEvents {
    receiver: mpsc::UnboundedReceiver<EngineEvent>,
    service: Weak<Mutex<Inner>>,
}

impl EngineEvents {
    /// Handle every callback that already arrived. Returns how many.
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.receiver.try_recv() {
            let Some(inner) = self.service.upgrade() else {
                break;
            };
            inner.lock().handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Handle callbacks until the service is dropped
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            let Some(inner) = self.service.upgrade() else {
                break;
            };
            inner.lock().handle_event(event);
        }
        debug!("Engine event loop finished");
    }
}

impl SpeakService {
    /// Create the service around an engine that is not initialized yet.
    /// Pause state left by an earlier session is restored into `Paused`.
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        bible: BibleSource,
        store: Arc<dyn KeyValueStore>,
        bookmarks: Arc<dyn BookmarkStore>,
        settings: SharedSettings,
        mut config: SpeakConfig,
    ) -> Result<(Self, EngineEvents)> {
        config.validate().map_err(SpeechError::Config)?;
        settings.read().validate().map_err(SpeechError::Config)?;
        if let Some(max) = engine.max_input_length() {
            config.max_chunk_length = config.max_chunk_length.min(max);
        }

        let config = Arc::new(config);
        let events = EventBus::new();
        let context = ProviderContext {
            settings: settings.clone(),
            config: config.clone(),
            store: store.clone(),
            bookmarks,
            events: events.clone(),
        };
        let system_locale = Locale::parse(&config.default_locale).unwrap_or_else(|| Locale::new("en"));
        let (sink, receiver) = engine_channel();

        let mut inner = Inner {
            engine,
            engine_state: EngineState::Released,
            pending_start: false,
            sink,
            config,
            settings,
            timing: SpeakTiming::new(store.clone()),
            language_support: LanguageSupport::new(store.clone()),
            store,
            bible: BibleProvider::bible(bible, context.clone()),
            keys: None,
            active: ProviderKind::Bible,
            context,
            events: events.clone(),
            state: SpeakState::Silent,
            generation: 0,
            next_seq: 0,
            last_chunk: None,
            system_locale,
            current_locale: None,
            interrupted: false,
        };
        inner.restore_pause_state();

        let inner = Arc::new(Mutex::new(inner));
        let engine_events = EngineEvents {
            receiver,
            service: Arc::downgrade(&inner),
        };
        Ok((Self { inner, events }, engine_events))
    }

    /// Read `book_id` from `verse` on
    pub fn speak_bible(&self, book_id: &str, verse: VerseRef) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.end_session();
        if let Err(e) = inner.bible.setup_reading(book_id, verse) {
            inner.stop(false);
            return Err(e);
        }
        inner.active = ProviderKind::Bible;
        info!("Speaking {} from {:?}", book_id, verse);
        inner.start_speaking()
    }

    /// Read a keyed document
    pub fn speak_keys(&self, document: Arc<KeyDocument>, reading: KeyReading) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.end_session();
        info!("Speaking {} from {:?}", document.id, reading.start);
        inner.key_provider(document.clone()).setup_reading(document, reading);
        inner.active = ProviderKind::Keys;
        inner.start_speaking()
    }

    /// Restore a paused keyed session of `document`. True when one was
    /// persisted for it; the service is then `Paused` at that position.
    pub fn resume_document(&self, document: Arc<KeyDocument>) -> bool {
        self.inner.lock().resume_document(document)
    }

    pub fn pause(&self, will_continue: bool) {
        self.inner.lock().pause(will_continue);
    }

    pub fn continue_after_pause(&self) -> Result<()> {
        self.inner.lock().resume(None)
    }

    /// Continue after moving back by `amount`, never before the place the
    /// reading session started
    pub fn continue_after_pause_with_rewind(&self, amount: RewindAmount) -> Result<()> {
        self.inner.lock().resume(Some(amount))
    }

    /// Stop playback. With `will_continue` the service is only
    /// `TemporarilyStopped` and keeps the engine.
    pub fn stop(&self, will_continue: bool) {
        self.inner.lock().stop(will_continue);
    }

    pub fn rewind(&self, amount: RewindAmount) {
        self.inner.lock().navigate(|provider| provider.rewind(amount, false));
    }

    pub fn forward(&self, amount: RewindAmount) {
        self.inner.lock().navigate(|provider| provider.forward(amount));
    }

    pub fn handle_engine_event(&self, event: EngineEvent) {
        self.inner.lock().handle_event(event);
    }

    pub fn update_settings(&self, settings: SpeakSettings, update_bookmark: bool) -> Result<()> {
        self.inner.lock().update_settings(settings, update_bookmark)
    }

    /// Interruption such as a phone call starting (`true`) or ending
    pub fn on_interruption(&self, active: bool) {
        self.inner.lock().on_interruption(active);
    }

    pub fn status_text(&self, flags: u32) -> String {
        let inner = self.inner.lock();
        match inner.state {
            SpeakState::Silent => "- Stopped -".to_string(),
            _ => inner.provider().status_text(flags),
        }
    }

    pub fn state(&self) -> SpeakState {
        self.inner.lock().state
    }

    pub fn is_speaking(&self) -> bool {
        self.state().is_speaking()
    }

    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    pub fn current_position(&self) -> Position {
        self.inner.lock().provider().current_position()
    }

    pub fn current_book(&self) -> String {
        self.inner.lock().provider().current_book()
    }

    pub fn active_provider(&self) -> ProviderKind {
        self.inner.lock().active
    }

    /// Estimated length of the paused content, 0 for unit based providers
    pub fn paused_total_secs(&self) -> u64 {
        let inner = self.inner.lock();
        inner.timing.secs_for_chars(inner.provider().total_chars())
    }

    pub fn paused_completed_secs(&self) -> u64 {
        let inner = self.inner.lock();
        inner.timing.secs_for_chars(inner.provider().spoken_chars())
    }

    /// True when a locale of `language` worked in this or an earlier session
    pub fn is_language_available(&self, language: &str) -> bool {
        self.inner.lock().language_support.is_language_known_supported(language)
    }

    pub fn current_locale(&self) -> Option<Locale> {
        self.inner.lock().current_locale.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SpeakEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> SpeakSettings {
        self.inner.lock().settings.read().clone()
    }
}

impl Inner {
    fn provider(&self) -> &dyn SpeakTextProvider {
        match (self.active, self.keys.as_ref()) {
            (ProviderKind::Keys, Some(keys)) => keys,
            _ => &self.bible,
        }
    }

    fn provider_mut(&mut self) -> &mut dyn SpeakTextProvider {
        match (self.active, self.keys.as_mut()) {
            (ProviderKind::Keys, Some(keys)) => keys,
            _ => &mut self.bible,
        }
    }

    /// Key provider reading `document`, created on first use
    fn key_provider(&mut self, document: Arc<KeyDocument>) -> &mut KeyProvider {
        let context = self.context.clone();
        let keys = self
            .keys
            .get_or_insert_with(|| KeyProvider::keys(document.clone(), context));
        keys.set_document(document);
        keys
    }

    fn set_state(&mut self, state: SpeakState) {
        if self.state != state {
            info!("Speak state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.events.state(state);
        }
    }

    fn next_generation(&mut self) {
        self.generation += 1;
        self.next_seq = 0;
        self.last_chunk = None;
        debug!("Speak generation {}", self.generation);
    }

    /// Drop everything the engine still has queued
    fn silence_engine(&mut self, keep_engine: bool) {
        match self.engine_state {
            EngineState::Ready => {
                if let Err(e) = self.engine.flush() {
                    warn!("Failed to flush engine: {}", e);
                }
                if let Err(e) = self.engine.stop() {
                    warn!("Failed to stop engine: {}", e);
                }
                if !keep_engine {
                    self.release_engine();
                }
            }
            EngineState::Initializing if !keep_engine => self.release_engine(),
            _ => {}
        }
    }

    fn release_engine(&mut self) {
        debug!("Releasing engine {}", self.engine.name());
        self.engine.shutdown();
        self.engine_state = EngineState::Released;
        self.pending_start = false;
    }

    /// Stop whatever is being read before a new session starts
    fn end_session(&mut self) {
        self.next_generation();
        self.silence_engine(true);
        if self.provider().is_speaking() {
            self.provider_mut().stop();
        }
        self.clear_pause_state();
    }

    fn start_speaking(&mut self) -> Result<()> {
        match self.engine_state {
            EngineState::Ready => {
                self.begin_speaking();
                Ok(())
            }
            EngineState::Initializing => {
                self.pending_start = true;
                Ok(())
            }
            EngineState::Released => {
                self.pending_start = true;
                self.acquire_engine()
            }
        }
    }

    fn acquire_engine(&mut self) -> Result<()> {
        info!("Initializing engine {}", self.engine.name());
        self.engine_state = EngineState::Initializing;
        if let Err(e) = self.engine.initialize(self.sink.clone()) {
            error!("Engine {} failed to start: {}", self.engine.name(), e);
            self.engine_state = EngineState::Released;
            self.pending_start = false;
            self.events.error(SpeakErrorKind::EngineUnavailable, e.to_string());
            self.provider_mut().stop();
            self.set_state(SpeakState::Silent);
            return Err(e);
        }
        Ok(())
    }

    fn on_initialized(&mut self, outcome: std::result::Result<(), String>) {
        if self.engine_state != EngineState::Initializing {
            debug!("Ignoring initialization report in state {:?}", self.engine_state);
            return;
        }
        if let Err(message) = outcome {
            error!("Engine {} failed to initialize: {}", self.engine.name(), message);
            self.events.error(SpeakErrorKind::EngineUnavailable, message);
            self.stop(false);
            return;
        }

        info!("Engine {} ready", self.engine.name());
        self.engine_state = EngineState::Ready;
        for earcon in Earcon::ALL {
            if let Err(e) = self.engine.add_earcon(earcon, earcon.id()) {
                warn!("Failed to register earcon {}: {}", earcon.id(), e);
            }
        }
        if self.pending_start {
            self.pending_start = false;
            self.begin_speaking();
        }
    }

    /// First locale of the preference list the engine accepts
    fn select_language(&mut self) -> Result<Locale> {
        let language = self.provider().language();
        let candidates = self
            .language_support
            .filter_candidates(preference_list(&language, &self.system_locale));
        let mut tried = Vec::new();
        for locale in candidates {
            let tag = locale.to_string();
            match self.engine.set_language(&tag) {
                LanguageStatus::Available => {
                    debug!("Speaking in {}", tag);
                    self.language_support.add_supported(&locale);
                    return Ok(locale);
                }
                status => {
                    warn!("Locale {} is not usable: {:?}", tag, status);
                    self.language_support.add_unsupported(&locale);
                    tried.push(tag);
                }
            }
        }
        Err(SpeechError::LanguageNotAvailable { tried })
    }

    fn apply_speech_rate(&self) {
        let rate = self.settings.read().playback.speech_rate();
        if let Err(e) = self.engine.set_speech_rate(rate) {
            warn!("Failed to set speech rate {}: {}", rate, e);
        }
    }

    fn begin_speaking(&mut self) {
        match self.select_language() {
            Ok(locale) => self.current_locale = Some(locale),
            Err(e) => {
                error!("{}", e);
                self.events.error(SpeakErrorKind::LanguageNotAvailable, e.to_string());
                self.stop(false);
                return;
            }
        }
        self.provider_mut().prepare_for_start_speaking();
        self.apply_speech_rate();
        self.clear_pause_state();
        self.set_state(SpeakState::Speaking);
        self.speak_next_chunk();
    }

    /// Hand the next look-ahead window to the engine
    fn speak_next_chunk(&mut self) {
        let generation = self.generation;
        let lookahead = self.config.lookahead_chunks;
        let mut batch: Vec<(ChunkId, SpeakCommand)> = Vec::with_capacity(lookahead);
        for i in 0..lookahead {
            let id = ChunkId::new(generation, self.next_seq);
            let Some(command) = self.provider_mut().next_speak_command(id, i == 0) else {
                break;
            };
            self.next_seq += 1;
            batch.push((id, command));
        }

        let Some((last, _)) = batch.last() else {
            info!("Nothing more to speak");
            self.stop(false);
            return;
        };
        self.last_chunk = Some(*last);

        for (id, command) in &batch {
            let utterance_id = id.utterance_id(&self.config.utterance_prefix);
            trace!("Queueing {} {}", utterance_id, command);
            if let Err(e) = command.dispatch(self.engine.as_ref(), &utterance_id, &self.config) {
                // a refused chunk never completes, so playback cannot go on
                error!("Engine refused {}: {}", utterance_id, e);
                self.events.error(SpeakErrorKind::EngineUnavailable, e.to_string());
                self.stop(false);
                return;
            }
        }
    }

    /// Chunk id of a callback, `None` for foreign or stale ids
    fn current_chunk(&self, utterance_id: &str) -> Option<ChunkId> {
        let Some(id) = ChunkId::parse(&self.config.utterance_prefix, utterance_id) else {
            trace!("Ignoring foreign utterance {}", utterance_id);
            return None;
        };
        if id.generation != self.generation {
            debug!("Ignoring stale utterance {}", utterance_id);
            return None;
        }
        Some(id)
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Initialized(outcome) => self.on_initialized(outcome),
            EngineEvent::Started(utterance_id) => self.on_started(&utterance_id),
            EngineEvent::Done(utterance_id) => self.on_done(&utterance_id),
            EngineEvent::Error(utterance_id) => {
                warn!("Engine failed on {}", utterance_id);
                self.on_done(&utterance_id);
            }
        }
    }

    fn on_started(&mut self, utterance_id: &str) {
        let Some(id) = self.current_chunk(utterance_id) else {
            return;
        };
        let chars = self.provider().text_len(id);
        self.timing.started(utterance_id, chars);
        if let Some(progress) = self.provider_mut().start_utterance(id) {
            self.events.progress(progress);
        }
    }

    fn on_done(&mut self, utterance_id: &str) {
        let Some(id) = self.current_chunk(utterance_id) else {
            return;
        };
        self.timing.finished(utterance_id);
        self.provider_mut().finished_utterance(id);
        if self.last_chunk == Some(id) && self.state.is_speaking() {
            self.speak_next_chunk();
        }
    }

    fn pause(&mut self, will_continue: bool) {
        if self.halt(will_continue) {
            self.set_state(SpeakState::Paused);
        }
    }

    /// Pause the provider and the engine and persist where we are. False
    /// when nothing was playing or paused.
    fn halt(&mut self, will_continue: bool) -> bool {
        if self.state == SpeakState::Silent && !self.pending_start {
            debug!("Nothing to pause");
            return false;
        }
        self.next_generation();
        self.pending_start = false;
        let fraction = self.timing.fraction_completed();
        let provider = self.provider_mut();
        provider.save_position(fraction);
        provider.pause();
        self.silence_engine(will_continue);
        self.persist_pause_state();
        true
    }

    fn resume(&mut self, rewind: Option<RewindAmount>) -> Result<()> {
        if !matches!(self.state, SpeakState::Paused | SpeakState::TemporarilyStopped) {
            debug!("Not paused, nothing to continue");
            return Ok(());
        }
        self.interrupted = false;
        self.next_generation();
        if let Some(amount) = rewind {
            self.provider_mut().rewind(amount, true);
        }
        self.start_speaking()
    }

    fn stop(&mut self, will_continue: bool) {
        self.next_generation();
        self.pending_start = false;
        self.provider_mut().stop();
        self.silence_engine(will_continue);
        self.clear_pause_state();
        self.interrupted = false;
        self.set_state(if will_continue {
            SpeakState::TemporarilyStopped
        } else {
            SpeakState::Silent
        });
    }

    /// Move the reading position and pick up from there if speaking
    fn navigate(&mut self, step: impl FnOnce(&mut dyn SpeakTextProvider)) {
        self.next_generation();
        self.silence_engine(true);
        step(self.provider_mut());
        match self.state {
            SpeakState::Speaking if self.engine_state == EngineState::Ready => self.speak_next_chunk(),
            SpeakState::Paused => self.persist_pause_state(),
            _ => {}
        }
    }

    fn update_settings(&mut self, settings: SpeakSettings, update_bookmark: bool) -> Result<()> {
        settings.validate().map_err(SpeechError::Config)?;
        let speaking = self.state.is_speaking();
        if speaking {
            self.pause(true);
        }
        self.provider_mut().update_settings(settings, update_bookmark);
        if speaking {
            self.resume(None)?;
        }
        Ok(())
    }

    fn on_interruption(&mut self, active: bool) {
        if active {
            let state = self.state;
            match state {
                SpeakState::Speaking if self.halt(false) => {
                    info!("Interrupted, stopping temporarily");
                    self.interrupted = true;
                    self.set_state(SpeakState::TemporarilyStopped);
                }
                SpeakState::Paused => {
                    // the saved pause state stays; only playback that was
                    // running resumes when the interruption ends
                    info!("Interrupted while paused");
                    self.silence_engine(false);
                    self.interrupted = false;
                    self.set_state(SpeakState::TemporarilyStopped);
                }
                _ => {}
            }
        } else if self.interrupted {
            info!("Interruption over, resuming");
            if let Err(e) = self.resume(None) {
                warn!("Failed to resume after interruption: {}", e);
            }
        }
    }

    fn persist_pause_state(&mut self) {
        if let Err(e) = self.provider().persist_state() {
            warn!("Failed to persist reading position: {}", e);
            return;
        }
        let mut result = self.store.set_string(SPEAK_PROVIDER, self.active.as_str());
        if let (Ok(()), Some(locale)) = (&result, &self.current_locale) {
            result = self.store.set_string(SPEAK_LOCALE, &locale.to_string());
        }
        match result {
            Ok(()) => debug!("Persisted pause state"),
            Err(e) => warn!("Failed to persist pause state: {}", e),
        }
    }

    fn clear_pause_state(&mut self) {
        self.provider().clear_persisted_state();
        for key in [SPEAK_PROVIDER, SPEAK_LOCALE] {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to clear {}: {}", key, e);
            }
        }
    }

    fn persisted_kind(&self) -> Option<ProviderKind> {
        self.store
            .get_string(SPEAK_PROVIDER)
            .and_then(|kind| ProviderKind::parse(&kind))
    }

    fn restore_persisted_locale(&mut self) {
        self.current_locale = self.store.get_string(SPEAK_LOCALE).and_then(|tag| Locale::parse(&tag));
    }

    fn restore_pause_state(&mut self) {
        if self.persisted_kind() != Some(ProviderKind::Bible) {
            return;
        }
        if self.bible.restore_state() {
            info!("Restored paused reading at {}", self.bible.current_position());
            self.restore_persisted_locale();
            self.active = ProviderKind::Bible;
            self.state = SpeakState::Paused;
        }
    }

    fn resume_document(&mut self, document: Arc<KeyDocument>) -> bool {
        if self.persisted_kind() != Some(ProviderKind::Keys)
            || self.store.get_string(SPEAK_KEY_DOCUMENT).as_deref() != Some(document.id.as_str())
        {
            return false;
        }
        let provider = self.key_provider(document);
        if !provider.restore_state() {
            return false;
        }
        info!("Restored paused reading at {}", provider.current_position());
        self.restore_persisted_locale();
        self.active = ProviderKind::Keys;
        self.set_state(SpeakState::Paused);
        true
    }
}
