//! Automatic "where was I" bookmarks
//!
//! While auto-bookmarking is on, pausing or stopping leaves a bookmark at
//! the start of the batch being read, tagged with the speaking label and
//! carrying the playback settings. Starting at a bookmarked position can
//! adopt those settings again.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use verbum_core::{Error as CoreError, PlaybackSettings, Position, Result as CoreResult, SpeakSettings};

/// Name of the reserved label marking the auto-tracked position
pub const SPEAK_LABEL_NAME: &str = "__SPEAK_LABEL__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Assigned by the store on creation
    pub id: Option<u64>,
    pub position: Position,
    /// Document a key position belongs to. Verse bookmarks hold for every
    /// Bible and leave it empty.
    #[serde(default)]
    pub document_id: Option<String>,
    pub playback_settings: Option<PlaybackSettings>,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl Bookmark {
    pub fn new(position: impl Into<Position>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            position: position.into(),
            document_id: None,
            playback_settings: None,
            created_on: now,
            updated_on: now,
        }
    }

    /// Bookmark at `position` of the document `document_id`
    pub fn in_document(position: impl Into<Position>, document_id: &str) -> Self {
        let mut bookmark = Self::new(position);
        if let Position::Key(_) = bookmark.position {
            bookmark.document_id = Some(document_id.to_string());
        }
        bookmark
    }

    /// True when this bookmark marks `position` in `document_id`
    pub fn is_at(&self, position: &Position, document_id: &str) -> bool {
        self.position == *position
            && match position {
                Position::Verse(_) => true,
                Position::Key(_) => self.document_id.as_deref() == Some(document_id),
            }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label {
    pub id: u64,
    pub name: String,
}

/// Bookmark persistence owned by the host
pub trait BookmarkStore: Send + Sync {
    /// Bookmark at exactly `position` of `document_id`; with a label, only
    /// one carrying it
    fn find_bookmark_at(
        &self,
        document_id: &str,
        position: &Position,
        label: Option<&Label>,
    ) -> CoreResult<Option<Bookmark>>;

    /// Insert or replace; the returned bookmark has its id set
    fn create_or_update(&self, bookmark: Bookmark) -> CoreResult<Bookmark>;

    fn delete(&self, bookmark: &Bookmark) -> CoreResult<()>;

    fn labels_for(&self, bookmark: &Bookmark) -> CoreResult<Vec<Label>>;

    fn set_labels(&self, bookmark: &Bookmark, labels: &[Label]) -> CoreResult<()>;

    /// The speaking label, created on first use
    fn speak_label(&self) -> CoreResult<Label>;
}

#[derive(Default)]
struct MemoryBookmarks {
    bookmarks: BTreeMap<u64, Bookmark>,
    labels: HashMap<u64, Label>,
    links: HashMap<u64, Vec<u64>>,
    next_id: u64,
}

impl MemoryBookmarks {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory [`BookmarkStore`]. Can be switched unavailable to exercise
/// failure handling.
#[derive(Default)]
pub struct MemoryBookmarkStore {
    inner: RwLock<MemoryBookmarks>,
    unavailable: AtomicBool,
}

impl MemoryBookmarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn bookmarks(&self) -> Vec<Bookmark> {
        self.inner.read().bookmarks.values().cloned().collect()
    }

    /// Add a label the way a user would
    pub fn create_label(&self, name: &str) -> Label {
        let mut inner = self.inner.write();
        let id = inner.allocate();
        let label = Label {
            id,
            name: name.to_string(),
        };
        inner.labels.insert(id, label.clone());
        label
    }

    fn check(&self) -> CoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Store("Bookmark store unavailable".to_string()));
        }
        Ok(())
    }

    fn id_of(bookmark: &Bookmark) -> CoreResult<u64> {
        bookmark
            .id
            .ok_or_else(|| CoreError::Bookmark("Bookmark has not been saved".to_string()))
    }
}

impl BookmarkStore for MemoryBookmarkStore {
    fn find_bookmark_at(
        &self,
        document_id: &str,
        position: &Position,
        label: Option<&Label>,
    ) -> CoreResult<Option<Bookmark>> {
        self.check()?;
        let inner = self.inner.read();
        Ok(inner
            .bookmarks
            .values()
            .filter(|b| b.is_at(position, document_id))
            .find(|b| match (label, b.id) {
                (None, _) => true,
                (Some(label), Some(id)) => inner.links.get(&id).map_or(false, |l| l.contains(&label.id)),
                (Some(_), None) => false,
            })
            .cloned())
    }

    fn create_or_update(&self, mut bookmark: Bookmark) -> CoreResult<Bookmark> {
        self.check()?;
        let mut inner = self.inner.write();
        let id = match bookmark.id {
            Some(id) if inner.bookmarks.contains_key(&id) => id,
            Some(id) => return Err(CoreError::Bookmark(format!("Unknown bookmark {}", id))),
            None => inner.allocate(),
        };
        bookmark.id = Some(id);
        bookmark.updated_on = Utc::now();
        inner.bookmarks.insert(id, bookmark.clone());
        Ok(bookmark)
    }

    fn delete(&self, bookmark: &Bookmark) -> CoreResult<()> {
        self.check()?;
        let id = Self::id_of(bookmark)?;
        let mut inner = self.inner.write();
        inner.bookmarks.remove(&id);
        inner.links.remove(&id);
        Ok(())
    }

    fn labels_for(&self, bookmark: &Bookmark) -> CoreResult<Vec<Label>> {
        self.check()?;
        let id = Self::id_of(bookmark)?;
        let inner = self.inner.read();
        Ok(inner
            .links
            .get(&id)
            .map(|ids| ids.iter().filter_map(|l| inner.labels.get(l).cloned()).collect())
            .unwrap_or_default())
    }

    fn set_labels(&self, bookmark: &Bookmark, labels: &[Label]) -> CoreResult<()> {
        self.check()?;
        let id = Self::id_of(bookmark)?;
        let mut inner = self.inner.write();
        if !inner.bookmarks.contains_key(&id) {
            return Err(CoreError::Bookmark(format!("Unknown bookmark {}", id)));
        }
        let mut ids: Vec<u64> = Vec::with_capacity(labels.len());
        for label in labels {
            if !ids.contains(&label.id) {
                ids.push(label.id);
            }
        }
        inner.links.insert(id, ids);
        Ok(())
    }

    fn speak_label(&self) -> CoreResult<Label> {
        self.check()?;
        let mut inner = self.inner.write();
        if let Some(label) = inner.labels.values().find(|l| l.name == SPEAK_LABEL_NAME) {
            return Ok(label.clone());
        }
        let id = inner.allocate();
        let label = Label {
            id,
            name: SPEAK_LABEL_NAME.to_string(),
        };
        inner.labels.insert(id, label.clone());
        Ok(label)
    }
}

/// Keeps the auto-bookmark of one provider in step with playback.
/// Store failures are logged and otherwise ignored.
pub struct BookmarkSync {
    store: Arc<dyn BookmarkStore>,
    active: Option<Bookmark>,
}

impl BookmarkSync {
    pub fn new(store: Arc<dyn BookmarkStore>) -> Self {
        Self { store, active: None }
    }

    pub fn active(&self) -> Option<&Bookmark> {
        self.active.as_ref()
    }

    /// Drop the reference to the active bookmark without touching it
    pub fn forget(&mut self) {
        self.active = None;
    }

    /// Look for a speaking bookmark at `position` of `document_id`. Returns
    /// the playback settings to adopt, without the bookmark bookkeeping fields.
    pub fn read(&mut self, position: Position, document_id: &str, settings: &SpeakSettings) -> Option<PlaybackSettings> {
        if !settings.auto_bookmark {
            return None;
        }
        match self.try_read(position, document_id, settings) {
            Ok(adopted) => adopted,
            Err(e) => {
                warn!("Failed to read speak bookmark at {}: {}", position, e);
                None
            }
        }
    }

    fn try_read(
        &mut self,
        position: Position,
        document_id: &str,
        settings: &SpeakSettings,
    ) -> CoreResult<Option<PlaybackSettings>> {
        let label = self.store.speak_label()?;
        let Some(bookmark) = self.store.find_bookmark_at(document_id, &position, Some(&label))? else {
            return Ok(None);
        };
        let adopted = bookmark
            .playback_settings
            .as_ref()
            .filter(|_| settings.restore_settings_from_bookmarks)
            .map(|p| p.without_bookmark_fields());
        debug!("Found speak bookmark {:?} at {}", bookmark.id, position);
        self.active = Some(bookmark);
        Ok(adopted)
    }

    /// Move the auto-bookmark to `start`
    pub fn update(&mut self, start: Position, document_id: &str, settings: &SpeakSettings) {
        self.remove();
        self.save(start, document_id, settings);
    }

    /// Take the speaking label off the active bookmark, deleting the
    /// bookmark when it only existed for playback.
    pub fn remove(&mut self) {
        if let Err(e) = self.try_remove() {
            warn!("Failed to remove speak bookmark: {}", e);
        }
    }

    fn try_remove(&mut self) -> CoreResult<()> {
        let Some(bookmark) = self.active.as_ref() else {
            return Ok(());
        };
        let label = self.store.speak_label()?;
        let mut labels = self.store.labels_for(bookmark)?;
        let Some(index) = labels.iter().position(|l| l.id == label.id) else {
            return Ok(());
        };

        let was_created = bookmark.playback_settings.as_ref().and_then(|p| p.bookmark_was_created);
        if labels.len() > 1 || was_created == Some(false) {
            labels.remove(index);
            let mut kept = bookmark.clone();
            kept.playback_settings = None;
            let kept = self.store.create_or_update(kept)?;
            self.store.set_labels(&kept, &labels)?;
            debug!("Removed speak label from bookmark {:?}", kept.id);
        } else {
            self.store.delete(bookmark)?;
            debug!("Deleted speak bookmark {:?}", bookmark.id);
        }
        self.active = None;
        Ok(())
    }

    /// Create or update the bookmark at `start` with the current settings
    pub fn save(&mut self, start: Position, document_id: &str, settings: &SpeakSettings) {
        if !settings.auto_bookmark {
            return;
        }
        if let Err(e) = self.try_save(start, document_id, settings) {
            warn!("Failed to save speak bookmark at {}: {}", start, e);
        }
    }

    fn try_save(&mut self, start: Position, document_id: &str, settings: &SpeakSettings) -> CoreResult<()> {
        let mut playback = settings.playback.clone();
        playback.book_id = Some(document_id.to_string());

        let mut labels = Vec::new();
        let bookmark = match self.store.find_bookmark_at(document_id, &start, None)? {
            None => {
                playback.bookmark_was_created = Some(true);
                let mut bookmark = Bookmark::in_document(start, document_id);
                bookmark.playback_settings = Some(playback);
                self.store.create_or_update(bookmark)?
            }
            Some(mut bookmark) => {
                playback.bookmark_was_created = Some(
                    bookmark
                        .playback_settings
                        .as_ref()
                        .and_then(|p| p.bookmark_was_created)
                        .unwrap_or(false),
                );
                labels = self.store.labels_for(&bookmark)?;
                bookmark.playback_settings = Some(playback);
                self.store.create_or_update(bookmark)?
            }
        };

        let label = self.store.speak_label()?;
        if !labels.iter().any(|l| l.id == label.id) {
            labels.push(label);
        }
        self.store.set_labels(&bookmark, &labels)?;
        debug!("Saved speak bookmark {:?} at {}", bookmark.id, start);
        self.active = Some(bookmark);
        Ok(())
    }

    /// Write new playback settings into the active bookmark, keeping its
    /// document and creation bookkeeping.
    pub fn update_settings(&mut self, playback: &PlaybackSettings) {
        let Some(mut bookmark) = self.active.clone() else {
            return;
        };
        let mut playback = playback.clone();
        if let Some(old) = bookmark.playback_settings.as_ref() {
            playback.book_id = old.book_id.clone();
            playback.bookmark_was_created = old.bookmark_was_created;
        }
        bookmark.playback_settings = Some(playback);
        match self.store.create_or_update(bookmark) {
            Ok(saved) => self.active = Some(saved),
            Err(e) => warn!("Failed to update speak bookmark settings: {}", e),
        }
    }
}
