//! Content sources: turn units into speak commands and navigate between them

use crate::commands::{CommandQueue, Earcon, SpeakCommand, TextKind, TextCommand};
use crate::config::SpeakConfig;
use crate::error::{Result, SpeechError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use verbum_core::{BookInfo, KeyDocument, KeyRef, PlaybackSettings, Unit, VerseRef, Versification};

/// Names used when announcing a position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    /// Spoken book name (document name for keyed documents)
    pub book: String,
    /// Chapter number (key index + 1 for keyed documents)
    pub container: u32,
    /// Key name, empty for Bibles
    pub key: String,
}

/// Navigation and rendering for one kind of content. Navigation wraps
/// at the document edges.
pub trait ContentSource: Send {
    type Unit: Unit;

    /// Id of the document being read
    fn document_id(&self) -> &str;

    /// Switch to the document `id`; false when it is not available
    fn select_document(&mut self, id: &str) -> bool {
        self.document_id() == id
    }

    /// Content language code, e.g. "en"
    fn language(&self) -> &str;

    /// Short document name for status text
    fn abbreviation(&self) -> String;

    /// Commands for one unit, possibly empty
    fn commands_for(&self, unit: &Self::Unit, settings: &PlaybackSettings, config: &SpeakConfig) -> CommandQueue;

    fn next(&self, unit: &Self::Unit) -> Self::Unit;

    fn previous(&self, unit: &Self::Unit) -> Self::Unit;

    /// First unit of the following container
    fn next_container(&self, unit: &Self::Unit) -> Self::Unit;

    /// First unit of the preceding container
    fn previous_container(&self, unit: &Self::Unit) -> Self::Unit;

    fn container_start(&self, unit: &Self::Unit) -> Self::Unit;

    fn first(&self) -> Self::Unit;

    /// Map a unit onto a valid reading position
    fn normalize(&self, unit: &Self::Unit) -> Self::Unit;

    fn name(&self, unit: &Self::Unit) -> String;

    fn range_name(&self, start: &Self::Unit, end: &Self::Unit) -> String;

    /// Reference form used for persistence
    fn reference(&self, unit: &Self::Unit) -> String;

    fn parse(&self, reference: &str) -> Option<Self::Unit>;

    fn heading(&self, unit: &Self::Unit, config: &SpeakConfig) -> Heading;

    /// Share of the book read at `unit`, 0.0..1.0
    fn percent_of_book(&self, unit: &Self::Unit) -> f64;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct VerseContent {
    title: Option<String>,
    text: String,
    footnotes: Vec<String>,
}

/// One Bible translation held in memory
#[derive(Debug, Clone)]
pub struct BibleText {
    pub id: String,
    pub name: String,
    pub language: String,
    pub abbreviation: String,
    versification: Versification,
    verses: HashMap<VerseRef, VerseContent>,
}

impl BibleText {
    pub fn versification(&self) -> &Versification {
        &self.versification
    }

    /// Parse a tab separated Bible:
    ///
    /// ```text
    /// !id        KJV
    /// !name      King James Version
    /// !language  en
    /// @Gen       Genesis   Gen
    /// Gen.1.1    v         In the beginning God created the heaven and the earth.
    /// Gen.1.1    t         The Creation
    /// Gen.1.1    n         A footnote
    /// ```
    ///
    /// `@` lines declare books in reading order; chapter and verse counts
    /// follow from the highest references seen. Columns are tab separated.
    pub fn from_tsv(text: &str) -> Result<Self> {
        let mut id = String::new();
        let mut name = String::new();
        let mut language = "en".to_string();
        let mut books: Vec<BookInfo> = Vec::new();
        let mut entries: Vec<(usize, u16, u16, char, String)> = Vec::new();

        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
            let bad_line = || SpeechError::Config(format!("line {}: cannot parse {:?}", line_no + 1, line));

            if let Some(key) = columns[0].strip_prefix('!') {
                let value = columns.get(1).ok_or_else(bad_line)?.to_string();
                match key {
                    "id" => id = value,
                    "name" => name = value,
                    "language" => language = value,
                    _ => debug!("Ignoring header {}", key),
                }
            } else if let Some(osis) = columns[0].strip_prefix('@') {
                let book_name = columns.get(1).filter(|n| !n.is_empty()).unwrap_or(&osis);
                let mut book = BookInfo::new(osis, *book_name, Vec::new());
                if let Some(abbreviation) = columns.get(2).filter(|a| !a.is_empty()) {
                    book = book.with_abbreviation(*abbreviation);
                }
                books.push(book);
            } else {
                if columns.len() < 3 {
                    return Err(bad_line());
                }
                let mut parts = columns[0].split('.');
                let osis = parts.next().ok_or_else(bad_line)?;
                let chapter: u16 = parts.next().and_then(|c| c.parse().ok()).ok_or_else(bad_line)?;
                let verse: u16 = parts.next().and_then(|v| v.parse().ok()).ok_or_else(bad_line)?;
                let book = books
                    .iter()
                    .position(|b| b.osis == osis)
                    .ok_or_else(|| SpeechError::Config(format!("line {}: unknown book {}", line_no + 1, osis)))?;
                let kind = columns[1].chars().next().ok_or_else(bad_line)?;
                if !matches!(kind, 'v' | 't' | 'n') || chapter == 0 {
                    return Err(bad_line());
                }
                entries.push((book, chapter, verse, kind, columns[2..].join("\t")));
            }
        }

        if id.is_empty() {
            return Err(SpeechError::Config("Bible has no !id header".to_string()));
        }

        // Verse 0 holds the chapter heading and is read with verse 1
        for (book, chapter, verse, _, _) in &entries {
            let chapters = &mut books[*book].chapters;
            if chapters.len() < *chapter as usize {
                chapters.resize(*chapter as usize, 1);
            }
            let count = &mut chapters[*chapter as usize - 1];
            *count = (*count).max((*verse).max(1));
        }

        let versification = Versification::new(books)?;
        let mut verses: HashMap<VerseRef, VerseContent> = HashMap::new();
        for (book, chapter, verse, kind, text) in entries {
            let key = VerseRef::new(book as u16, chapter, verse.max(1));
            let content = verses.entry(key).or_default();
            match kind {
                't' => content.title = Some(text),
                'n' => content.footnotes.push(text),
                _ => {
                    if !content.text.is_empty() {
                        content.text.push(' ');
                    }
                    content.text.push_str(&text);
                }
            }
        }

        info!("Loaded Bible {} with {} verses", id, verses.len());
        Ok(Self {
            abbreviation: id.clone(),
            name: if name.is_empty() { id.clone() } else { name },
            id,
            language,
            versification,
            verses,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(verbum_core::Error::from)?;
        Self::from_tsv(&text)
    }

    pub fn verse_text(&self, verse: &VerseRef) -> Option<&str> {
        self.verses.get(verse).map(|c| c.text.as_str())
    }
}

/// Bible content for the Bible provider. Holds every available
/// translation; one of them is current.
pub struct BibleSource {
    library: HashMap<String, Arc<BibleText>>,
    current: Arc<BibleText>,
}

impl BibleSource {
    pub fn new(bible: BibleText) -> Self {
        let current = Arc::new(bible);
        let mut library = HashMap::new();
        library.insert(current.id.clone(), current.clone());
        Self { library, current }
    }

    pub fn add(&mut self, bible: BibleText) {
        self.library.insert(bible.id.clone(), Arc::new(bible));
    }

    pub fn has_document(&self, id: &str) -> bool {
        self.library.contains_key(id)
    }

    pub fn set_document(&mut self, id: &str) -> Result<()> {
        let bible = self
            .library
            .get(id)
            .ok_or_else(|| verbum_core::Error::UnknownDocument(id.to_string()))?;
        self.current = bible.clone();
        Ok(())
    }

    pub fn current(&self) -> &BibleText {
        &self.current
    }

    fn v11n(&self) -> &Versification {
        &self.current.versification
    }
}

impl ContentSource for BibleSource {
    type Unit = VerseRef;

    fn document_id(&self) -> &str {
        &self.current.id
    }

    fn select_document(&mut self, id: &str) -> bool {
        self.set_document(id).is_ok()
    }

    fn language(&self) -> &str {
        &self.current.language
    }

    fn abbreviation(&self) -> String {
        self.current.abbreviation.clone()
    }

    fn commands_for(&self, unit: &VerseRef, settings: &PlaybackSettings, config: &SpeakConfig) -> CommandQueue {
        let mut commands = CommandQueue::new(config.max_chunk_length);
        let Some(content) = self.current.verses.get(unit) else {
            return commands;
        };
        if let Some(title) = content.title.as_ref().filter(|_| settings.speak_titles) {
            commands.push(SpeakCommand::earcon(Earcon::PreTitle, true));
            commands.push(SpeakCommand::Text(TextCommand::new(title, TextKind::Title)));
            commands.push(SpeakCommand::silence_of(config.silence_ms));
        }
        commands.push(SpeakCommand::text(&content.text));
        if settings.speak_footnotes {
            for note in &content.footnotes {
                commands.push(SpeakCommand::earcon(Earcon::PreFootnote, true));
                commands.push(SpeakCommand::text(note));
                commands.push(SpeakCommand::earcon(Earcon::PostFootnote, true));
            }
        }
        commands
    }

    fn next(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().next_verse(unit)
    }

    fn previous(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().previous_verse(unit)
    }

    fn next_container(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().next_chapter(unit)
    }

    fn previous_container(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().previous_chapter(unit)
    }

    fn container_start(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().normalize(*unit).chapter_start()
    }

    fn first(&self) -> VerseRef {
        self.v11n().first()
    }

    fn normalize(&self, unit: &VerseRef) -> VerseRef {
        self.v11n().normalize(*unit)
    }

    fn name(&self, unit: &VerseRef) -> String {
        self.v11n().name(unit)
    }

    fn range_name(&self, start: &VerseRef, end: &VerseRef) -> String {
        self.v11n().range_name(start, end)
    }

    fn reference(&self, unit: &VerseRef) -> String {
        self.v11n().osis(unit)
    }

    fn parse(&self, reference: &str) -> Option<VerseRef> {
        self.v11n().parse(reference)
    }

    fn heading(&self, unit: &VerseRef, config: &SpeakConfig) -> Heading {
        let book = self
            .v11n()
            .book(unit.book)
            .map(|b| config.phrases.spoken_book_name(&b.name))
            .unwrap_or_default();
        Heading {
            book,
            container: unit.chapter as u32,
            key: String::new(),
        }
    }

    fn percent_of_book(&self, unit: &VerseRef) -> f64 {
        self.v11n().percent_of_book(unit)
    }
}

/// Keyed document content for the key provider
pub struct KeySource {
    document: Arc<KeyDocument>,
}

impl KeySource {
    pub fn new(document: Arc<KeyDocument>) -> Self {
        Self { document }
    }

    pub fn set_document(&mut self, document: Arc<KeyDocument>) {
        self.document = document;
    }

    pub fn document(&self) -> &Arc<KeyDocument> {
        &self.document
    }
}

impl ContentSource for KeySource {
    type Unit = KeyRef;

    fn document_id(&self) -> &str {
        &self.document.id
    }

    fn language(&self) -> &str {
        &self.document.language
    }

    fn abbreviation(&self) -> String {
        self.document.name.clone()
    }

    fn commands_for(&self, unit: &KeyRef, _settings: &PlaybackSettings, config: &SpeakConfig) -> CommandQueue {
        let mut commands = CommandQueue::new(config.max_chunk_length);
        if let Some(paragraph) = self.document.paragraph(unit) {
            if !paragraph.trim().is_empty() {
                commands.push(SpeakCommand::text(paragraph));
                commands.push(SpeakCommand::silence_of(config.silence_ms));
            }
        }
        commands
    }

    fn next(&self, unit: &KeyRef) -> KeyRef {
        self.document.next(unit)
    }

    fn previous(&self, unit: &KeyRef) -> KeyRef {
        self.document.previous(unit)
    }

    fn next_container(&self, unit: &KeyRef) -> KeyRef {
        self.document.next_key(unit)
    }

    fn previous_container(&self, unit: &KeyRef) -> KeyRef {
        self.document.previous_key(unit)
    }

    fn container_start(&self, unit: &KeyRef) -> KeyRef {
        unit.key_start()
    }

    fn first(&self) -> KeyRef {
        self.document.first()
    }

    fn normalize(&self, unit: &KeyRef) -> KeyRef {
        self.document.normalize(*unit)
    }

    fn name(&self, unit: &KeyRef) -> String {
        self.document.key_name(unit).to_string()
    }

    fn range_name(&self, start: &KeyRef, end: &KeyRef) -> String {
        if start.key == end.key {
            self.name(start)
        } else {
            format!("{} - {}", self.name(start), self.name(end))
        }
    }

    fn reference(&self, unit: &KeyRef) -> String {
        format!("{}.{}", unit.key, unit.ordinal)
    }

    fn parse(&self, reference: &str) -> Option<KeyRef> {
        let (key, ordinal) = reference.split_once('.')?;
        let unit = KeyRef::new(key.parse().ok()?, ordinal.parse().ok()?);
        if self.document.paragraph(&unit).is_some() {
            Some(unit)
        } else {
            None
        }
    }

    fn heading(&self, unit: &KeyRef, _config: &SpeakConfig) -> Heading {
        Heading {
            book: self.document.name.clone(),
            container: unit.key + 1,
            key: self.document.key_name(unit).to_string(),
        }
    }

    fn percent_of_book(&self, unit: &KeyRef) -> f64 {
        self.document.percent(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIBLE: &str = "!id\tTEST\n!name\tTest Bible\n@Gen\tGenesis\tGen\n@1Sam\t1. Samuel\n\
Gen.1.1\tt\tThe Creation\nGen.1.1\tv\tIn the beginning.\nGen.1.1\tn\tHeaven means sky\nGen.1.2\tv\tSecond.\n\
Gen.2.1\tv\tThird.\n1Sam.1.1\tv\tHannah.\n";

    #[test]
    fn test_tsv_builds_versification() {
        let bible = BibleText::from_tsv(BIBLE).unwrap();
        let v11n = bible.versification();
        assert_eq!(v11n.book_count(), 2);
        assert_eq!(v11n.book(0).unwrap().chapters, vec![2, 1]);
        assert_eq!(bible.verse_text(&VerseRef::new(0, 1, 2)), Some("Second."));
    }

    #[test]
    fn test_tsv_rejects_unknown_book() {
        let err = BibleText::from_tsv("!id\tX\n@Gen\tGenesis\nExod.1.1\tv\tno\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_titles_and_footnotes_follow_settings() {
        let source = BibleSource::new(BibleText::from_tsv(BIBLE).unwrap());
        let config = SpeakConfig::default();
        let mut settings = PlaybackSettings::default();
        let verse = VerseRef::new(0, 1, 1);

        let with_title = source.commands_for(&verse, &settings, &config);
        assert_eq!(with_title.front(), Some(&SpeakCommand::earcon(Earcon::PreTitle, true)));
        assert!(with_title.iter().any(|c| c.is_title()));
        assert!(!with_title.to_string().contains("sky"));

        settings.speak_titles = false;
        settings.speak_footnotes = true;
        let plain = source.commands_for(&verse, &settings, &config);
        assert!(!plain.iter().any(|c| c.is_title()));
        assert!(plain.to_string().contains("[pre-footnote] Heaven means sky [post-footnote]"));
    }

    #[test]
    fn test_heading_uses_spoken_book_name() {
        let source = BibleSource::new(BibleText::from_tsv(BIBLE).unwrap());
        let heading = source.heading(&VerseRef::new(1, 1, 1), &SpeakConfig::default());
        assert_eq!(heading.book, "First Samuel");
        assert_eq!(heading.container, 1);
    }

    #[test]
    fn test_key_source_reference_round_trip() {
        let doc = KeyDocument::from_plain_text("d", "Doc", "# A\none\n\ntwo\n").unwrap();
        let source = KeySource::new(Arc::new(doc));
        let unit = KeyRef::new(0, 1);
        assert_eq!(source.parse(&source.reference(&unit)), Some(unit));
        assert_eq!(source.parse("5.0"), None);
        assert_eq!(source.commands_for(&unit, &PlaybackSettings::default(), &SpeakConfig::default()).len(), 2);
    }
}
