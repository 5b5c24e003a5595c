// Book/chapter/verse tables and verse navigation

use crate::error::{Error, Result};
use crate::position::VerseRef;
use serde::{Deserialize, Serialize};

/// One book of a versification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookInfo {
    /// OSIS identifier, e.g. "Gen"
    pub osis: String,
    /// Display name, e.g. "Genesis"
    pub name: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
    /// Verse count per chapter, chapter 1 first
    pub chapters: Vec<u16>,
}

impl BookInfo {
    pub fn new(osis: impl Into<String>, name: impl Into<String>, chapters: Vec<u16>) -> Self {
        Self {
            osis: osis.into(),
            name: name.into(),
            abbreviation: None,
            chapters,
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = Some(abbreviation.into());
        self
    }

    pub fn chapter_count(&self) -> u16 {
        self.chapters.len() as u16
    }

    pub fn verse_count(&self, chapter: u16) -> u16 {
        if chapter == 0 {
            return 0;
        }
        self.chapters.get(chapter as usize - 1).copied().unwrap_or(0)
    }

    pub fn total_verses(&self) -> u32 {
        self.chapters.iter().map(|&c| c as u32).sum()
    }

    pub fn short_name(&self) -> &str {
        self.abbreviation.as_deref().unwrap_or(&self.osis)
    }
}

/// Ordered list of books making up a Bible. All navigation wraps: moving
/// past the last verse of the last book continues at the first verse of
/// the first book and the other way around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BookInfo>", into = "Vec<BookInfo>")]
pub struct Versification {
    books: Vec<BookInfo>,
}

impl Versification {
    pub fn new(books: Vec<BookInfo>) -> Result<Self> {
        if books.is_empty() {
            return Err(Error::Versification("versification has no books".to_string()));
        }
        for book in &books {
            if book.chapters.is_empty() {
                return Err(Error::Versification(format!("book {} has no chapters", book.osis)));
            }
            if let Some(pos) = book.chapters.iter().position(|&verses| verses == 0) {
                return Err(Error::Versification(format!(
                    "{} chapter {} has no verses",
                    book.osis,
                    pos + 1
                )));
            }
            if book.chapters.len() > u16::MAX as usize {
                return Err(Error::Versification(format!("book {} has too many chapters", book.osis)));
            }
        }
        if books.len() > u16::MAX as usize {
            return Err(Error::Versification("too many books".to_string()));
        }
        Ok(Self { books })
    }

    pub fn books(&self) -> &[BookInfo] {
        &self.books
    }

    pub fn book(&self, index: u16) -> Option<&BookInfo> {
        self.books.get(index as usize)
    }

    pub fn book_count(&self) -> u16 {
        self.books.len() as u16
    }

    pub fn book_index(&self, osis: &str) -> Option<u16> {
        self.books
            .iter()
            .position(|b| b.osis.eq_ignore_ascii_case(osis))
            .map(|i| i as u16)
    }

    pub fn contains(&self, verse: &VerseRef) -> bool {
        match self.book(verse.book) {
            Some(book) => verse.verse >= 1 && verse.verse <= book.verse_count(verse.chapter),
            None => false,
        }
    }

    /// Map any verse onto a valid reading position. Verse 0 becomes verse 1,
    /// out of range chapters and verses are clamped, unknown books fall back
    /// to the first verse.
    pub fn normalize(&self, verse: VerseRef) -> VerseRef {
        let Some(book) = self.book(verse.book) else {
            return self.first();
        };
        let chapter = verse.chapter.clamp(1, book.chapter_count());
        let verse_no = verse.verse.clamp(1, book.verse_count(chapter));
        VerseRef::new(verse.book, chapter, verse_no)
    }

    pub fn first(&self) -> VerseRef {
        VerseRef::new(0, 1, 1)
    }

    pub fn last(&self) -> VerseRef {
        let book = self.book_count() - 1;
        let chapter = self.books[book as usize].chapter_count();
        self.last_verse_of(book, chapter)
    }

    fn last_verse_of(&self, book: u16, chapter: u16) -> VerseRef {
        let verses = self.book(book).map(|b| b.verse_count(chapter)).unwrap_or(1);
        VerseRef::new(book, chapter, verses.max(1))
    }

    pub fn next_verse(&self, verse: &VerseRef) -> VerseRef {
        let verse = self.normalize(*verse);
        let book = &self.books[verse.book as usize];
        if verse.verse < book.verse_count(verse.chapter) {
            VerseRef::new(verse.book, verse.chapter, verse.verse + 1)
        } else {
            self.next_chapter(&verse)
        }
    }

    pub fn previous_verse(&self, verse: &VerseRef) -> VerseRef {
        let verse = self.normalize(*verse);
        if verse.verse > 1 {
            return VerseRef::new(verse.book, verse.chapter, verse.verse - 1);
        }
        let start = self.previous_chapter(&verse);
        self.last_verse_of(start.book, start.chapter)
    }

    /// First verse of the following chapter
    pub fn next_chapter(&self, verse: &VerseRef) -> VerseRef {
        let verse = self.normalize(*verse);
        let book = &self.books[verse.book as usize];
        if verse.chapter < book.chapter_count() {
            VerseRef::new(verse.book, verse.chapter + 1, 1)
        } else if verse.book + 1 < self.book_count() {
            VerseRef::new(verse.book + 1, 1, 1)
        } else {
            self.first()
        }
    }

    /// First verse of the preceding chapter
    pub fn previous_chapter(&self, verse: &VerseRef) -> VerseRef {
        let verse = self.normalize(*verse);
        if verse.chapter > 1 {
            VerseRef::new(verse.book, verse.chapter - 1, 1)
        } else {
            let book = if verse.book == 0 { self.book_count() - 1 } else { verse.book - 1 };
            VerseRef::new(book, self.books[book as usize].chapter_count(), 1)
        }
    }

    /// Share of the book read when `verse` starts, 0.0..1.0
    pub fn percent_of_book(&self, verse: &VerseRef) -> f64 {
        let verse = self.normalize(*verse);
        let book = &self.books[verse.book as usize];
        let before: u32 = book.chapters[..verse.chapter as usize - 1]
            .iter()
            .map(|&c| c as u32)
            .sum::<u32>()
            + verse.verse as u32
            - 1;
        before as f64 / book.total_verses().max(1) as f64
    }

    /// OSIS reference such as "Gen.1.1"
    pub fn osis(&self, verse: &VerseRef) -> String {
        match self.book(verse.book) {
            Some(book) => format!("{}.{}.{}", book.osis, verse.chapter, verse.verse),
            None => format!("?.{}.{}", verse.chapter, verse.verse),
        }
    }

    /// Human readable reference such as "Genesis 1:1"
    pub fn name(&self, verse: &VerseRef) -> String {
        match self.book(verse.book) {
            Some(book) => format!("{} {}:{}", book.name, verse.chapter, verse.verse),
            None => format!("{}:{}", verse.chapter, verse.verse),
        }
    }

    pub fn range_name(&self, start: &VerseRef, end: &VerseRef) -> String {
        if start == end {
            return self.name(start);
        }
        if start.book == end.book && start.chapter == end.chapter {
            return format!("{}-{}", self.name(start), end.verse);
        }
        format!("{} - {}", self.name(start), self.name(end))
    }

    /// Parse "Gen", "Gen.1" or "Gen.1.1". Missing parts default to 1.
    pub fn parse(&self, reference: &str) -> Option<VerseRef> {
        let mut parts = reference.trim().split('.');
        let book = self.book_index(parts.next()?)?;
        let chapter = match parts.next() {
            Some(c) => c.parse::<u16>().ok()?,
            None => 1,
        };
        let verse = match parts.next() {
            Some(v) => v.parse::<u16>().ok()?,
            None => 1,
        };
        if parts.next().is_some() {
            return None;
        }
        // verse 0 is the chapter heading slot and reads as verse 1
        let candidate = VerseRef::new(book, chapter, verse.max(1));
        if self.contains(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

impl TryFrom<Vec<BookInfo>> for Versification {
    type Error = Error;

    fn try_from(books: Vec<BookInfo>) -> Result<Self> {
        Self::new(books)
    }
}

impl From<Versification> for Vec<BookInfo> {
    fn from(v11n: Versification) -> Self {
        v11n.books
    }
}
