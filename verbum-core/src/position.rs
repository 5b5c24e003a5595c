// Positions inside narrated content: Bible verses and keyed document paragraphs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;

/// How two consecutive units relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    /// Same chapter (or same document key)
    SameUnit,
    /// Chapter or document key changed within the same book
    ContainerChanged,
    /// Book changed
    BookChanged,
}

/// The smallest navigable piece of content.
///
/// Ordering follows reading order inside one document, so `a < b` means `a`
/// is read before `b` when no wrap-around happens.
pub trait Unit: Clone + Eq + Ord + Hash + fmt::Debug + Send + Sync + Into<Position> + 'static {
    /// Monotonic ordinal in reading order
    fn ordinal(&self) -> u64;

    /// Book (or whole document) this unit belongs to
    fn book(&self) -> u32;

    /// Containing chapter or document key
    fn container(&self) -> u32;

    /// True for the first unit of its container
    fn is_container_start(&self) -> bool;

    /// Recover a unit from its type-erased form
    fn from_position(position: &Position) -> Option<Self>;

    fn boundary(&self, next: &Self) -> Boundary {
        if self.book() != next.book() {
            Boundary::BookChanged
        } else if self.container() != next.container() {
            Boundary::ContainerChanged
        } else {
            Boundary::SameUnit
        }
    }
}

/// A verse inside a versification. `book` is the index of the book in the
/// versification, chapters and verses are 1-based. Verse 0 (the chapter
/// heading slot) may appear in input but is never a reading position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VerseRef {
    pub book: u16,
    pub chapter: u16,
    pub verse: u16,
}

impl VerseRef {
    pub fn new(book: u16, chapter: u16, verse: u16) -> Self {
        Self { book, chapter, verse }
    }

    /// First verse of the same chapter
    pub fn chapter_start(&self) -> Self {
        Self { verse: 1, ..*self }
    }
}

impl Unit for VerseRef {
    fn ordinal(&self) -> u64 {
        ((self.book as u64) << 32) | ((self.chapter as u64) << 16) | self.verse as u64
    }

    fn book(&self) -> u32 {
        self.book as u32
    }

    fn container(&self) -> u32 {
        self.chapter as u32
    }

    fn is_container_start(&self) -> bool {
        self.verse <= 1
    }

    fn from_position(position: &Position) -> Option<Self> {
        match position {
            Position::Verse(verse) => Some(*verse),
            Position::Key(_) => None,
        }
    }
}

impl From<VerseRef> for Position {
    fn from(verse: VerseRef) -> Self {
        Position::Verse(verse)
    }
}

/// A paragraph inside a keyed document: `key` is the index of the document
/// key, `ordinal` the 0-based paragraph inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyRef {
    pub key: u32,
    pub ordinal: u32,
}

impl KeyRef {
    pub fn new(key: u32, ordinal: u32) -> Self {
        Self { key, ordinal }
    }

    pub fn key_start(&self) -> Self {
        Self { key: self.key, ordinal: 0 }
    }
}

impl Unit for KeyRef {
    fn ordinal(&self) -> u64 {
        ((self.key as u64) << 32) | self.ordinal as u64
    }

    // A keyed document is a single book
    fn book(&self) -> u32 {
        0
    }

    fn container(&self) -> u32 {
        self.key
    }

    fn is_container_start(&self) -> bool {
        self.ordinal == 0
    }

    fn from_position(position: &Position) -> Option<Self> {
        match position {
            Position::Key(key) => Some(*key),
            Position::Verse(_) => None,
        }
    }
}

impl From<KeyRef> for Position {
    fn from(key: KeyRef) -> Self {
        Position::Key(key)
    }
}

/// Type-erased position used by events, bookmarks and persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Position {
    Verse(VerseRef),
    Key(KeyRef),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Verse(v) => write!(f, "{}:{}:{}", v.book, v.chapter, v.verse),
            Position::Key(k) => write!(f, "key {}#{}", k.key, k.ordinal),
        }
    }
}

/// Start and end of the content covered by one batch of commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub start: Position,
    pub end: Position,
}

impl PositionRange {
    pub fn new(start: impl Into<Position>, end: impl Into<Position>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn single(position: impl Into<Position>) -> Self {
        let position = position.into();
        Self {
            start: position,
            end: position,
        }
    }
}

/// Range playback limit configured by the user. Reading never leaves it:
/// moving past `end` continues from `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeLimit {
    pub start: Position,
    pub end: Position,
}

impl RangeLimit {
    pub fn new(start: impl Into<Position>, end: impl Into<Position>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Typed bounds, if the limit applies to this kind of unit
    pub fn bounds<U: Unit>(&self) -> Option<(U, U)> {
        let start = U::from_position(&self.start)?;
        let end = U::from_position(&self.end)?;
        if start <= end {
            Some((start, end))
        } else {
            Some((end, start))
        }
    }

    pub fn contains<U: Unit>(&self, unit: &U) -> bool {
        match self.bounds::<U>() {
            Some((start, end)) => start <= *unit && *unit <= end,
            None => false,
        }
    }
}

/// Clamp a unit into `[start, end]`: anything outside continues from `start`.
pub fn clamp_to_range<U: Unit>(unit: U, start: &U, end: &U) -> U {
    if unit < *start || unit > *end {
        start.clone()
    } else {
        unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verse_ordering_follows_reading_order() {
        let a = VerseRef::new(0, 1, 31);
        let b = VerseRef::new(0, 2, 1);
        let c = VerseRef::new(1, 1, 1);
        assert!(a < b && b < c);
        assert!(a.ordinal() < b.ordinal() && b.ordinal() < c.ordinal());
    }

    #[test]
    fn test_boundaries() {
        let v = VerseRef::new(0, 1, 5);
        assert_eq!(v.boundary(&VerseRef::new(0, 1, 6)), Boundary::SameUnit);
        assert_eq!(v.boundary(&VerseRef::new(0, 2, 1)), Boundary::ContainerChanged);
        assert_eq!(v.boundary(&VerseRef::new(1, 1, 1)), Boundary::BookChanged);

        let k = KeyRef::new(2, 3);
        assert_eq!(k.boundary(&KeyRef::new(2, 4)), Boundary::SameUnit);
        assert_eq!(k.boundary(&KeyRef::new(3, 0)), Boundary::ContainerChanged);
    }

    #[test]
    fn test_clamp_to_range() {
        let start = VerseRef::new(0, 1, 10);
        let end = VerseRef::new(0, 1, 20);
        assert_eq!(clamp_to_range(VerseRef::new(0, 1, 21), &start, &end), start);
        assert_eq!(clamp_to_range(VerseRef::new(0, 1, 9), &start, &end), start);
        assert_eq!(clamp_to_range(VerseRef::new(0, 1, 15), &start, &end), VerseRef::new(0, 1, 15));
    }

    #[test]
    fn test_range_limit_ignores_other_unit_kinds() {
        let limit = RangeLimit::new(VerseRef::new(0, 1, 1), VerseRef::new(0, 1, 3));
        assert!(limit.contains(&VerseRef::new(0, 1, 2)));
        assert!(!limit.contains(&KeyRef::new(0, 0)));
        assert!(limit.bounds::<KeyRef>().is_none());
    }

    #[test]
    fn test_position_serde() {
        let position = Position::Key(KeyRef::new(4, 2));
        let json = serde_json::to_string(&position).unwrap();
        assert!(json.contains("\"kind\":\"key\""));
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, position);
    }
}
