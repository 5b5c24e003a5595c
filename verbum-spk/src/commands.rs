//! Speak commands and the merging command queue

use crate::config::SpeakConfig;
use crate::engines::{LanguageStatus, SynthesisEngine};
use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::OnceLock;
use tracing::error;

/// Default chunk limit when the engine does not report one
pub const DEFAULT_MAX_CHUNK_LENGTH: usize = 4000;

/// Default length of an enabled silence
pub const DEFAULT_SILENCE_MS: u32 = 500;

fn ends_with_sentence_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?s).*[.?!]+["']*\W*$"#).expect("Invalid regex pattern"))
}

fn split_into_two_sentences() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?s)(.*)([.?!]+["']*)(\W*.+)$"#).expect("Invalid regex pattern"))
}

fn starts_with_delimiter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"^(?s)([,.?!"':;()]+|'s)( .*|)$"#).expect("Invalid regex pattern"))
}

/// Break `text` into pieces of at most `max` bytes. Cuts go after the last
/// sentence end that fits, else at the last space, else at the limit.
pub fn break_up_text(text: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while rest.len() > max {
        let (head, tail) = rest.split_at(cut_point(rest, max));
        let head = head.trim_end();
        if !head.is_empty() {
            pieces.push(head.to_string());
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

fn cut_point(text: &str, max: usize) -> usize {
    let mut limit = max.min(text.len());
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    if limit == 0 {
        // a single character wider than the limit
        return text.char_indices().nth(1).map_or(text.len(), |(i, _)| i);
    }
    let spaces: Vec<usize> = text
        .char_indices()
        .take_while(|(i, _)| *i <= limit)
        .filter(|(i, c)| *i > 0 && c.is_whitespace())
        .map(|(i, _)| i)
        .collect();
    let ends_sentence =
        |end: usize| text[..end].trim_end_matches(&['"', '\''][..]).ends_with(&['.', '?', '!'][..]);
    spaces
        .iter()
        .rev()
        .find(|i| ends_sentence(**i))
        .or(spaces.last())
        .copied()
        .unwrap_or(limit)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextKind {
    #[default]
    Normal,
    Title,
}

/// Text to speak. The content is trimmed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextCommand {
    text: String,
    kind: TextKind,
}

impl TextCommand {
    pub fn new(text: impl AsRef<str>, kind: TextKind) -> Self {
        Self {
            text: text.as_ref().trim().to_string(),
            kind,
        }
    }

    pub fn normal(text: impl AsRef<str>) -> Self {
        Self::new(text, TextKind::Normal)
    }

    pub fn title(text: impl AsRef<str>) -> Self {
        Self::new(text, TextKind::Title)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> TextKind {
        self.kind
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Short sounds marking structure in the narration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Earcon {
    PreBookChange,
    PreChapterChange,
    PreTitle,
    PreFootnote,
    PostFootnote,
}

impl Earcon {
    pub const ALL: [Earcon; 5] = [
        Earcon::PreBookChange,
        Earcon::PreChapterChange,
        Earcon::PreTitle,
        Earcon::PreFootnote,
        Earcon::PostFootnote,
    ];

    /// Id the earcon is registered under in the engine
    pub fn id(&self) -> &'static str {
        match self {
            Earcon::PreBookChange => "[pre-book-change]",
            Earcon::PreChapterChange => "[pre-chapter-change]",
            Earcon::PreTitle => "[pre-title]",
            Earcon::PreFootnote => "[pre-footnote]",
            Earcon::PostFootnote => "[post-footnote]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpeakCommand {
    Text(TextCommand),
    Silence { duration_ms: u32, enabled: bool },
    Earcon { earcon: Earcon, enabled: bool },
    LanguageSwitch { locale: String },
}

impl SpeakCommand {
    pub fn text(text: impl AsRef<str>) -> Self {
        SpeakCommand::Text(TextCommand::normal(text))
    }

    pub fn title(text: impl AsRef<str>) -> Self {
        SpeakCommand::Text(TextCommand::title(text))
    }

    pub fn silence() -> Self {
        Self::silence_of(DEFAULT_SILENCE_MS)
    }

    pub fn silence_of(duration_ms: u32) -> Self {
        SpeakCommand::Silence {
            duration_ms,
            enabled: true,
        }
    }

    /// Pause between paragraphs
    pub fn paragraph_change() -> Self {
        Self::silence()
    }

    pub fn earcon(earcon: Earcon, enabled: bool) -> Self {
        SpeakCommand::Earcon { earcon, enabled }
    }

    pub fn language_switch(locale: impl Into<String>) -> Self {
        SpeakCommand::LanguageSwitch { locale: locale.into() }
    }

    pub fn as_text(&self) -> Option<&TextCommand> {
        match self {
            SpeakCommand::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_title(&self) -> bool {
        matches!(self, SpeakCommand::Text(t) if t.kind == TextKind::Title)
    }

    fn is_enabled_silence(&self) -> bool {
        matches!(self, SpeakCommand::Silence { enabled: true, .. })
    }

    /// Characters spoken by this command, used for timing
    pub fn char_len(&self) -> usize {
        match self {
            SpeakCommand::Text(text) => text.text.chars().count(),
            _ => 0,
        }
    }

    /// Hand the command to the engine under `utterance_id`. Every command
    /// produces exactly one engine utterance so completion callbacks always
    /// arrive: disabled earcons and silences play a zero-length silence.
    pub fn dispatch(&self, engine: &dyn SynthesisEngine, utterance_id: &str, config: &SpeakConfig) -> Result<()> {
        match self {
            SpeakCommand::Text(text) => engine.speak(&text.text, utterance_id),
            SpeakCommand::Silence { duration_ms, enabled } => {
                engine.play_silence(if *enabled { *duration_ms } else { 0 }, utterance_id)
            }
            SpeakCommand::Earcon { earcon, enabled } => {
                if *enabled {
                    engine.play_earcon(*earcon, config.earcon_volume, utterance_id)
                } else {
                    engine.play_silence(0, utterance_id)
                }
            }
            SpeakCommand::LanguageSwitch { locale } => {
                if engine.set_language(locale) != LanguageStatus::Available {
                    error!("Language {} not available!", locale);
                }
                engine.play_silence(0, utterance_id)
            }
        }
    }
}

impl fmt::Display for SpeakCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakCommand::Text(text) => write!(f, "{}", text.text),
            SpeakCommand::Silence { duration_ms, enabled } => {
                write!(f, "<silence {}ms>", if *enabled { *duration_ms } else { 0 })
            }
            SpeakCommand::Earcon { earcon, .. } => write!(f, "{}", earcon.id()),
            SpeakCommand::LanguageSwitch { locale } => write!(f, "<language {}>", locale),
        }
    }
}

impl From<TextCommand> for SpeakCommand {
    fn from(text: TextCommand) -> Self {
        SpeakCommand::Text(text)
    }
}

/// Ordered commands with merge rules applied on every insert:
/// empty text is dropped, text longer than `max_length` is broken up,
/// adjacent text is joined while the result fits `max_length`, and a
/// silence after an enabled silence is dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandQueue {
    commands: VecDeque<SpeakCommand>,
    max_length: usize,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_LENGTH)
    }
}

impl CommandQueue {
    pub fn new(max_length: usize) -> Self {
        Self {
            commands: VecDeque::new(),
            max_length,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Empty queue with the same chunk limit
    pub fn empty_like(&self) -> Self {
        Self::new(self.max_length)
    }

    /// Append a command. Returns false when it was dropped.
    pub fn push(&mut self, command: SpeakCommand) -> bool {
        match command {
            SpeakCommand::Text(text) => {
                if text.is_empty() {
                    return false;
                }
                if text.text.len() > self.max_length {
                    for piece in break_up_text(&text.text, self.max_length) {
                        self.push_text(TextCommand::new(piece, text.kind));
                    }
                } else {
                    self.push_text(text);
                }
                true
            }
            SpeakCommand::Silence { .. } => {
                if self.commands.back().map_or(false, |c| c.is_enabled_silence()) {
                    return false;
                }
                self.commands.push_back(command);
                true
            }
            other => {
                self.commands.push_back(other);
                true
            }
        }
    }

    fn push_text(&mut self, text: TextCommand) {
        if let Some(SpeakCommand::Text(last)) = self.commands.back_mut() {
            let separator = if starts_with_delimiter().is_match(&text.text) { "" } else { " " };
            let merged_len = last.text.len() + separator.len() + text.text.len();
            if merged_len <= self.max_length {
                last.text.push_str(separator);
                last.text.push_str(&text.text);
                return;
            }
        }
        self.commands.push_back(SpeakCommand::Text(text));
    }

    /// Insert at the head. Text merges with a leading text as "new old",
    /// keeping the kind of the new text.
    pub fn push_front(&mut self, command: SpeakCommand) -> bool {
        match command {
            SpeakCommand::Text(text) => {
                if text.is_empty() {
                    return false;
                }
                if text.text.len() > self.max_length {
                    for piece in break_up_text(&text.text, self.max_length).into_iter().rev() {
                        self.push_text_front(TextCommand::new(piece, text.kind));
                    }
                } else {
                    self.push_text_front(text);
                }
                true
            }
            SpeakCommand::Silence { enabled: true, .. }
                if self.commands.front().map_or(false, |c| c.is_enabled_silence()) =>
            {
                false
            }
            other => {
                self.commands.push_front(other);
                true
            }
        }
    }

    fn push_text_front(&mut self, text: TextCommand) {
        if let Some(SpeakCommand::Text(first)) = self.commands.front_mut() {
            if text.text.len() + 1 + first.text.len() <= self.max_length {
                first.text = format!("{} {}", text.text, first.text);
                first.kind = text.kind;
                return;
            }
        }
        self.commands.push_front(SpeakCommand::Text(text));
    }

    /// True when the queue ends on a finished sentence. Anything other than
    /// text at the end counts as a break; so does an empty queue.
    pub fn ends_sentence(&self) -> bool {
        match self.commands.back() {
            Some(SpeakCommand::Text(text)) => ends_with_sentence_break().is_match(&text.text),
            _ => true,
        }
    }

    /// Append `batch` up to the first sentence break. The first text with a
    /// sentence terminator followed by more words is split: the head goes
    /// into this queue, the tail and every later command go to `rest`.
    pub fn add_until_sentence_break(&mut self, batch: impl IntoIterator<Item = SpeakCommand>, rest: &mut CommandQueue) {
        let mut break_found = false;
        let mut text_continuation = false;

        for command in batch {
            if break_found {
                rest.push(command);
                continue;
            }
            match command {
                SpeakCommand::Text(text) => {
                    let split = if ends_with_sentence_break().is_match(&text.text) {
                        None
                    } else {
                        split_into_two_sentences().captures(&text.text).map(|caps| {
                            let head = format!(
                                "{}{}",
                                caps.get(1).map_or("", |m| m.as_str()),
                                caps.get(2).map_or("", |m| m.as_str())
                            );
                            let tail = caps.get(3).map_or("", |m| m.as_str()).to_string();
                            (head, tail)
                        })
                    };
                    match split {
                        Some((head, tail)) => {
                            self.push(SpeakCommand::Text(TextCommand::new(head, text.kind)));
                            rest.push(SpeakCommand::Text(TextCommand::new(tail, text.kind)));
                            break_found = true;
                        }
                        None => {
                            self.push(SpeakCommand::Text(text));
                            text_continuation = true;
                        }
                    }
                }
                // any other command after some text also ends the sentence
                other => {
                    self.push(other);
                    if text_continuation {
                        break_found = true;
                    }
                }
            }
        }
    }

    pub fn pop_front(&mut self) -> Option<SpeakCommand> {
        self.commands.pop_front()
    }

    pub fn front(&self) -> Option<&SpeakCommand> {
        self.commands.front()
    }

    pub fn last(&self) -> Option<&SpeakCommand> {
        self.commands.back()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpeakCommand> {
        self.commands.iter()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Move every command of `other` into this queue, merging as usual
    pub fn append(&mut self, other: &mut CommandQueue) {
        while let Some(command) = other.pop_front() {
            self.push(command);
        }
    }

    pub fn char_len(&self) -> usize {
        self.commands.iter().map(|c| c.char_len()).sum()
    }
}

impl Extend<SpeakCommand> for CommandQueue {
    fn extend<I: IntoIterator<Item = SpeakCommand>>(&mut self, iter: I) {
        for command in iter {
            self.push(command);
        }
    }
}

impl IntoIterator for CommandQueue {
    type Item = SpeakCommand;
    type IntoIter = std::collections::vec_deque::IntoIter<SpeakCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.into_iter()
    }
}

impl fmt::Display for CommandQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for command in &self.commands {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", command)?;
            first = false;
        }
        Ok(())
    }
}
