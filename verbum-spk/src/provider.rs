//! Speak text providers
//!
//! A provider turns a content source into a stream of speak commands. It
//! pulls units, batches their commands up to a sentence break, announces
//! boundaries and keeps a snapshot per handed-out chunk so the position
//! can be recovered when the engine reports on it later.

use crate::announce::{Announcer, ChapterAnnouncer, KeyAnnouncer, Transition};
use crate::bookmarks::{BookmarkStore, BookmarkSync};
use crate::commands::{CommandQueue, SpeakCommand};
use crate::config::SpeakConfig;
use crate::engines::ChunkId;
use crate::error::Result;
use crate::events::{EventBus, ProgressEvent, SpeakEvent};
use crate::persist::{
    PROVIDER_BIBLE, PROVIDER_KEYS, SPEAK_BIBLE_BOOK, SPEAK_BIBLE_VERSE, SPEAK_KEY_DOCUMENT, SPEAK_KEY_POSITION,
};
use crate::source::{BibleSource, ContentSource, KeySource};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use verbum_core::{
    clamp_to_range, KeyDocument, KeyRef, KeyValueStore, PlaybackSettings, Position, PositionRange, RewindAmount,
    SharedSettings, SpeakSettings, Unit, VerseRef,
};

/// Status text shows the percentage of the book read
pub const SHOW_PERCENT: u32 = 0b01;
/// Status text shows the document abbreviation
pub const SHOW_BOOK: u32 = 0b10;
pub const SHOW_ALL: u32 = SHOW_PERCENT | SHOW_BOOK;

const TEN_STEPS: usize = 10;

/// Upper bound on consecutive empty units skipped in one refill
const MAX_EMPTY_UNITS: usize = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Bible,
    Keys,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Bible => PROVIDER_BIBLE,
            ProviderKind::Keys => PROVIDER_KEYS,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            PROVIDER_BIBLE => Some(ProviderKind::Bible),
            PROVIDER_KEYS => Some(ProviderKind::Keys),
            _ => None,
        }
    }

    fn persist_keys(&self) -> (&'static str, &'static str) {
        match self {
            ProviderKind::Bible => (SPEAK_BIBLE_BOOK, SPEAK_BIBLE_VERSE),
            ProviderKind::Keys => (SPEAK_KEY_DOCUMENT, SPEAK_KEY_POSITION),
        }
    }
}

/// What was being read when a chunk was handed out. Never changed after
/// creation.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceState<U> {
    pub document_id: String,
    /// First unit of the batch
    pub start: U,
    /// Last unit of the batch
    pub end: U,
    /// Where reading continues after the batch
    pub current: U,
    pub command: Option<SpeakCommand>,
}

/// Which part of a keyed document to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyReading {
    pub start: KeyRef,
    /// Hard stop: reading ends after this paragraph
    pub end: Option<KeyRef>,
    /// Loop back to `start` after `end` instead of stopping
    pub repeat: bool,
}

impl KeyReading {
    /// Read on from `start` through the whole document
    pub fn from(start: KeyRef) -> Self {
        Self {
            start,
            end: None,
            repeat: false,
        }
    }

    pub fn until(mut self, end: KeyRef) -> Self {
        self.end = Some(end);
        self
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }
}

/// Collaborators shared by every provider of a service
#[derive(Clone)]
pub struct ProviderContext {
    pub settings: SharedSettings,
    pub config: Arc<SpeakConfig>,
    pub store: Arc<dyn KeyValueStore>,
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub events: EventBus,
}

/// The contract the speech service drives. Implementations are not
/// thread-safe; the service calls them under its lock.
pub trait SpeakTextProvider: Send {
    fn kind(&self) -> ProviderKind;

    /// Language code of the content
    fn language(&self) -> String;

    /// Next command to hand to the engine, refilling as needed. `None`
    /// when there is nothing left to read. Marking a chunk current drops
    /// the snapshots of every older chunk.
    fn next_speak_command(&mut self, id: ChunkId, mark_as_current: bool) -> Option<SpeakCommand>;

    fn is_more_text_to_speak(&self) -> bool;

    fn prepare_for_start_speaking(&mut self);

    fn pause(&mut self);

    fn stop(&mut self);

    /// Go back to the last chunk marked current and drop all look-ahead
    fn reset(&mut self);

    /// `auto_rewind` keeps the result at or after the session start
    fn rewind(&mut self, amount: RewindAmount, auto_rewind: bool);

    fn forward(&mut self, amount: RewindAmount);

    /// Progress event for a chunk the engine started
    fn start_utterance(&mut self, id: ChunkId) -> Option<ProgressEvent>;

    fn finished_utterance(&mut self, id: ChunkId);

    /// Spoken characters of a handed-out chunk
    fn text_len(&self, id: ChunkId) -> usize;

    fn save_position(&mut self, fraction_completed: f64);

    fn update_settings(&mut self, settings: SpeakSettings, update_bookmark: bool);

    fn persist_state(&self) -> Result<()>;

    /// Restore persisted state; true when there was state to restore
    fn restore_state(&mut self) -> bool;

    fn clear_persisted_state(&self);

    fn status_text(&self, flags: u32) -> String;

    fn current_position(&self) -> Position;

    /// Id of the document being read
    fn current_book(&self) -> String;

    fn set_speaking(&mut self, speaking: bool);

    fn is_speaking(&self) -> bool;

    fn total_chars(&self) -> usize {
        0
    }

    fn spoken_chars(&self) -> usize {
        0
    }
}

/// One provider implementation for every kind of content
pub struct SpeakProvider<S: ContentSource> {
    source: S,
    announcer: Box<dyn Announcer>,
    kind: ProviderKind,
    settings: SharedSettings,
    config: Arc<SpeakConfig>,
    store: Arc<dyn KeyValueStore>,
    bookmarks: BookmarkSync,
    events: EventBus,

    start: S::Unit,
    end: S::Unit,
    current: S::Unit,
    /// Last unit of the previous batch; `None` right after a jump
    previous: Option<S::Unit>,
    session_start: S::Unit,
    hard_stop: Option<S::Unit>,
    session_loop: Option<(S::Unit, S::Unit)>,
    exhausted: bool,

    carry_over: CommandQueue,
    queue: CommandQueue,
    utterances: HashMap<ChunkId, Arc<UtteranceState<S::Unit>>>,
    current_utterance: Option<ChunkId>,
    last_unit_with_title: Option<S::Unit>,
    render_cache: LruCache<S::Unit, CommandQueue>,
    speaking: bool,
}

pub type BibleProvider = SpeakProvider<BibleSource>;
pub type KeyProvider = SpeakProvider<KeySource>;

impl<S: ContentSource> SpeakProvider<S> {
    pub fn new(source: S, announcer: Box<dyn Announcer>, kind: ProviderKind, context: ProviderContext) -> Self {
        let first = source.first();
        let cache_size = NonZeroUsize::new(context.config.render_cache_size).unwrap_or(NonZeroUsize::MIN);
        let max_length = context.config.max_chunk_length;
        Self {
            source,
            announcer,
            kind,
            settings: context.settings,
            config: context.config,
            store: context.store,
            bookmarks: BookmarkSync::new(context.bookmarks),
            events: context.events,
            start: first.clone(),
            end: first.clone(),
            current: first.clone(),
            previous: None,
            session_start: first,
            hard_stop: None,
            session_loop: None,
            exhausted: false,
            carry_over: CommandQueue::new(max_length),
            queue: CommandQueue::new(max_length),
            utterances: HashMap::new(),
            current_utterance: None,
            last_unit_with_title: None,
            render_cache: LruCache::new(cache_size),
            speaking: false,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Start a new reading session at `start`
    pub fn setup(&mut self, start: S::Unit, end: Option<S::Unit>, repeat: bool) {
        self.reset();
        let start = self.source.normalize(&start);
        let end = end.map(|end| {
            let end = self.source.normalize(&end);
            if end < start {
                start.clone()
            } else {
                end
            }
        });
        self.session_loop = match (&end, repeat) {
            (Some(end), true) => Some((start.clone(), end.clone())),
            _ => None,
        };
        self.hard_stop = if repeat { None } else { end };
        self.start = start.clone();
        self.end = start.clone();
        self.current = start.clone();
        self.session_start = start;
        self.previous = None;
        self.exhausted = false;
        debug!("Reading set up at {:?}", self.start);
    }

    pub fn bookmark_sync(&self) -> &BookmarkSync {
        &self.bookmarks
    }

    fn playback(&self) -> PlaybackSettings {
        self.settings.read().playback.clone()
    }

    fn limit(&self, settings: &PlaybackSettings) -> Option<(S::Unit, S::Unit)> {
        if let Some(bounds) = self.session_loop.clone() {
            return Some(bounds);
        }
        settings.range.as_ref().and_then(|r| r.bounds::<S::Unit>())
    }

    fn clamp(&self, unit: S::Unit, limit: &Option<(S::Unit, S::Unit)>) -> S::Unit {
        match limit {
            Some((start, end)) => clamp_to_range(unit, start, end),
            None => unit,
        }
    }

    fn past_hard_stop(&self, unit: &S::Unit) -> bool {
        self.hard_stop.as_ref().map_or(false, |stop| unit > stop)
    }

    /// Following unit, or `None` at the hard stop
    fn advance(&self, unit: &S::Unit, limit: &Option<(S::Unit, S::Unit)>) -> Option<S::Unit> {
        if self.hard_stop.as_ref().map_or(false, |stop| unit >= stop) {
            return None;
        }
        Some(self.clamp(self.source.next(unit), limit))
    }

    fn render(&mut self, unit: &S::Unit, settings: &PlaybackSettings) -> CommandQueue {
        if let Some(cached) = self.render_cache.get(unit) {
            return cached.clone();
        }
        let commands = self.source.commands_for(unit, settings, &self.config);
        self.render_cache.put(unit.clone(), commands.clone());
        commands
    }

    fn announce(&self, previous: Option<&S::Unit>, unit: &S::Unit, settings: &PlaybackSettings) -> Vec<SpeakCommand> {
        let heading = self.source.heading(unit, &self.config);
        self.announcer
            .announce(Transition::between(previous, unit), &heading, settings, &self.config)
    }

    fn next_non_empty(
        &mut self,
        unit: S::Unit,
        limit: &Option<(S::Unit, S::Unit)>,
        settings: &PlaybackSettings,
    ) -> Option<(S::Unit, CommandQueue)> {
        let first = unit.clone();
        let mut unit = unit;
        for _ in 0..MAX_EMPTY_UNITS {
            let commands = self.render(&unit, settings);
            if !commands.is_empty() {
                return Some((unit, commands));
            }
            let next = self.advance(&unit, limit)?;
            if next == first {
                warn!("Nothing to speak in {}", self.source.document_id());
                return None;
            }
            unit = next;
        }
        warn!("Gave up looking for content after {:?}", first);
        None
    }

    fn finish_batch(&mut self, end: S::Unit, next: Option<S::Unit>) {
        self.end = end.clone();
        self.previous = Some(end.clone());
        match next {
            Some(next) => self.current = next,
            None => {
                info!("Reached the end of {}", self.source.document_id());
                self.current = end;
                self.exhausted = true;
            }
        }
    }

    /// Build the next batch: carry-over first, then whole units until the
    /// batch ends a sentence.
    fn more_commands(&mut self) -> Option<CommandQueue> {
        if self.exhausted {
            return None;
        }
        let settings = self.playback();
        let limit = self.limit(&settings);
        let max_length = self.config.max_chunk_length;

        let mut unit = self.clamp(self.current.clone(), &limit);
        if self.past_hard_stop(&unit) {
            self.exhausted = true;
            return None;
        }
        self.start = unit.clone();
        let mut commands = CommandQueue::new(max_length);

        if !self.carry_over.is_empty() {
            commands.append(&mut self.carry_over);
            match self.advance(&unit, &limit) {
                Some(next) => unit = next,
                None => {
                    self.finish_batch(unit, None);
                    return Some(commands);
                }
            }
        }

        let Some((mut unit, mut batch)) = self.next_non_empty(unit, &limit, &settings) else {
            self.exhausted = true;
            return (!commands.is_empty()).then_some(commands);
        };
        commands.extend(self.announce(self.previous.as_ref(), &unit, &settings));
        commands.append(&mut batch);

        let mut rest = CommandQueue::new(max_length);
        while !commands.ends_sentence() {
            let Some(next) = self.advance(&unit, &limit) else {
                break;
            };
            // wrapped, looped, or a source that does not move forward
            if next.ordinal() <= unit.ordinal() {
                debug!("Look-ahead stopped at {:?}", next);
                break;
            }
            let mut next_commands = CommandQueue::new(max_length);
            next_commands.extend(self.announce(Some(&unit), &next, &settings));
            next_commands.append(&mut self.render(&next, &settings));
            commands.add_until_sentence_break(next_commands, &mut rest);
            unit = next;
        }

        if rest.is_empty() {
            let next = self.advance(&unit, &limit);
            self.finish_batch(unit, next);
        } else {
            self.carry_over = rest;
            self.finish_batch(unit.clone(), Some(unit));
        }
        trace!("Batch {:?}..{:?}: {}", self.start, self.end, commands);
        Some(commands)
    }

    fn current_state(&self) -> UtteranceState<S::Unit> {
        self.current_utterance
            .and_then(|id| self.utterances.get(&id))
            .map(|state| state.as_ref().clone())
            .unwrap_or_else(|| UtteranceState {
                document_id: self.source.document_id().to_string(),
                start: self.start.clone(),
                end: self.end.clone(),
                current: self.current.clone(),
                command: None,
            })
    }

    fn update_bookmark(&mut self) {
        let settings = self.settings.read().clone();
        let document_id = self.source.document_id().to_string();
        self.bookmarks.update(self.start.clone().into(), &document_id, &settings);
    }

    /// Report a jump: clear stale titles when moving back past the last
    /// titled unit, then the new position.
    fn publish_jump(&self, clear_title: bool) {
        if clear_title {
            self.events.publish(SpeakEvent::ClearTitle);
        }
        self.events.progress(ProgressEvent {
            book: self.source.document_id().to_string(),
            range: PositionRange::new(self.start.clone(), self.current.clone()),
            command: None,
            force_follow: true,
        });
    }

    fn jump_to(&mut self, target: S::Unit) {
        self.current = target.clone();
        self.start = target.clone();
        self.end = target;
        self.previous = None;
        self.exhausted = false;
    }
}

impl<S: ContentSource> SpeakTextProvider for SpeakProvider<S> {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn language(&self) -> String {
        self.source.language().to_string()
    }

    fn next_speak_command(&mut self, id: ChunkId, mark_as_current: bool) -> Option<SpeakCommand> {
        while self.queue.is_empty() {
            self.queue = self.more_commands()?;
        }
        let command = self.queue.pop_front()?;
        if mark_as_current {
            self.utterances.clear();
            self.current_utterance = Some(id);
            debug!("Marked current chunk {}", id);
        }
        self.utterances.insert(
            id,
            Arc::new(UtteranceState {
                document_id: self.source.document_id().to_string(),
                start: self.start.clone(),
                end: self.end.clone(),
                current: self.current.clone(),
                command: Some(command.clone()),
            }),
        );
        Some(command)
    }

    fn is_more_text_to_speak(&self) -> bool {
        !self.exhausted || !self.queue.is_empty() || !self.carry_over.is_empty()
    }

    fn prepare_for_start_speaking(&mut self) {
        if self.hard_stop.is_none() {
            let settings = self.settings.read().clone();
            let document_id = self.source.document_id().to_string();
            if let Some(adopted) = self.bookmarks.read(self.current.clone().into(), &document_id, &settings) {
                info!("Adopting playback settings from bookmark");
                self.settings.write().playback = adopted;
                self.render_cache.clear();
            }
        }
        self.speaking = true;
    }

    fn pause(&mut self) {
        self.reset();
        self.current = self.start.clone();
        if self.hard_stop.is_none() {
            self.update_bookmark();
        }
        self.speaking = false;
    }

    fn stop(&mut self) {
        self.reset();
        if self.speaking && self.hard_stop.is_none() {
            self.update_bookmark();
        }
        self.speaking = false;
        self.bookmarks.forget();
    }

    fn reset(&mut self) {
        let state = self.current_utterance.and_then(|id| self.utterances.get(&id)).cloned();
        if let Some(state) = state {
            debug!("Resetting to chunk state at {:?}", state.start);
            self.start = state.start.clone();
            self.current = state.current.clone();
        }
        self.end = self.start.clone();
        self.previous = None;
        self.exhausted = false;
        self.last_unit_with_title = None;
        self.carry_over.clear();
        self.queue.clear();
        self.utterances.clear();
        self.current_utterance = None;
        self.render_cache.clear();
    }

    fn rewind(&mut self, amount: RewindAmount, auto_rewind: bool) {
        let last_title = self.last_unit_with_title.clone();
        self.reset();
        let start = self.start.clone();

        let mut target = match amount {
            RewindAmount::SmartUnit => match last_title.clone().filter(|title| *title != start) {
                Some(title) => title,
                None if start.is_container_start() => self.source.previous_container(&start),
                None => self.source.container_start(&start),
            },
            RewindAmount::OneStep => self.source.previous(&start),
            RewindAmount::TenSteps => (0..TEN_STEPS).fold(start.clone(), |unit, _| self.source.previous(&unit)),
            RewindAmount::None => start.clone(),
        };

        if auto_rewind && target < self.session_start {
            target = self.session_start.clone();
        }
        let limit = self.limit(&self.playback());
        let target = self.clamp(target, &limit);

        let clear_title = last_title.map_or(true, |title| target < title);
        debug!("Rewind {:?} from {:?} to {:?}", amount, start, target);
        self.jump_to(target);
        self.publish_jump(clear_title);
    }

    fn forward(&mut self, amount: RewindAmount) {
        if amount == RewindAmount::None {
            return;
        }
        self.reset();
        let start = self.start.clone();
        let target = match amount {
            RewindAmount::SmartUnit => self.source.next_container(&start),
            RewindAmount::OneStep => self.source.next(&start),
            _ => (0..TEN_STEPS).fold(start.clone(), |unit, _| self.source.next(&unit)),
        };
        let limit = self.limit(&self.playback());
        let target = self.clamp(target, &limit);
        debug!("Forward {:?} from {:?} to {:?}", amount, start, target);
        self.jump_to(target);
        self.publish_jump(true);
    }

    fn start_utterance(&mut self, id: ChunkId) -> Option<ProgressEvent> {
        self.current_utterance = Some(id);
        let state = self.utterances.get(&id)?.clone();
        trace!("Started chunk {} at {:?}", id, state.start);
        if state.command.as_ref().map_or(false, |c| c.is_title()) {
            self.last_unit_with_title = Some(state.start.clone());
        }
        Some(ProgressEvent {
            book: state.document_id.clone(),
            range: PositionRange::new(state.start.clone(), state.end.clone()),
            command: state.command.clone(),
            force_follow: false,
        })
    }

    fn finished_utterance(&mut self, id: ChunkId) {
        trace!("Finished chunk {}", id);
    }

    fn text_len(&self, id: ChunkId) -> usize {
        self.utterances
            .get(&id)
            .and_then(|state| state.command.as_ref())
            .map_or(0, |command| command.char_len())
    }

    fn save_position(&mut self, _fraction_completed: f64) {}

    fn update_settings(&mut self, settings: SpeakSettings, update_bookmark: bool) {
        debug!("Speak settings updated");
        let playback = settings.playback.clone();
        *self.settings.write() = settings;
        self.render_cache.clear();
        if update_bookmark {
            self.bookmarks.update_settings(&playback);
        }
    }

    fn persist_state(&self) -> Result<()> {
        let (document_key, position_key) = self.kind.persist_keys();
        self.store.set_string(document_key, self.source.document_id())?;
        self.store
            .set_string(position_key, &self.source.reference(&self.start))?;
        Ok(())
    }

    fn restore_state(&mut self) -> bool {
        let (document_key, position_key) = self.kind.persist_keys();
        let Some(reference) = self.store.get_string(position_key) else {
            return false;
        };
        if let Some(document_id) = self.store.get_string(document_key) {
            if !self.source.select_document(&document_id) {
                warn!("Cannot restore reading: document {} is not available", document_id);
                return false;
            }
        }
        match self.source.parse(&reference) {
            Some(unit) => {
                info!("Restored reading position {}", reference);
                self.setup(unit, None, false);
                true
            }
            None => {
                warn!("Cannot restore reading position {}", reference);
                false
            }
        }
    }

    fn clear_persisted_state(&self) {
        let (document_key, position_key) = self.kind.persist_keys();
        for key in [document_key, position_key] {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to clear {}: {}", key, e);
            }
        }
    }

    fn status_text(&self, flags: u32) -> String {
        let state = self.current_state();
        let mut text = self.source.range_name(&state.start, &state.end);
        if flags & SHOW_PERCENT != 0 {
            let percent = (self.source.percent_of_book(&state.start) * 100.0).round() as u32;
            text.push_str(&format!(" - {}%", percent));
        }
        if flags & SHOW_BOOK != 0 {
            text.push_str(&format!(" - {}", self.source.abbreviation()));
        }
        text
    }

    fn current_position(&self) -> Position {
        self.current_state().start.into()
    }

    fn current_book(&self) -> String {
        self.source.document_id().to_string()
    }

    fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }

    fn is_speaking(&self) -> bool {
        self.speaking
    }
}

impl SpeakProvider<BibleSource> {
    pub fn bible(source: BibleSource, context: ProviderContext) -> Self {
        Self::new(source, Box::new(ChapterAnnouncer), ProviderKind::Bible, context)
    }

    /// Read `document_id` from `verse` on
    pub fn setup_reading(&mut self, document_id: &str, verse: VerseRef) -> Result<()> {
        self.reset();
        self.source.set_document(document_id)?;
        self.setup(verse, None, false);
        Ok(())
    }

    pub fn source_mut(&mut self) -> &mut BibleSource {
        &mut self.source
    }
}

impl SpeakProvider<KeySource> {
    pub fn keys(document: Arc<KeyDocument>, context: ProviderContext) -> Self {
        Self::new(KeySource::new(document), Box::new(KeyAnnouncer), ProviderKind::Keys, context)
    }

    /// Switch to `document`, reading from its first paragraph
    pub fn set_document(&mut self, document: Arc<KeyDocument>) {
        self.reset();
        self.source.set_document(document);
        let first = self.source.first();
        self.setup(first, None, false);
    }

    pub fn setup_reading(&mut self, document: Arc<KeyDocument>, reading: KeyReading) {
        self.reset();
        self.source.set_document(document);
        self.setup(reading.start, reading.end, reading.repeat);
    }
}
