//! Auto-bookmark behaviour through the orchestrator

use std::sync::Arc;
use verbum_core::{KeyDocument, KeyRef, MemoryStore, PlaybackSettings, Position, RewindAmount, SpeakSettings, VerseRef};
use verbum_spk::{
    BibleSource, BibleText, Bookmark, BookmarkStore, BookmarkSync, EngineCall, EngineEvents, KeyReading,
    MemoryBookmarkStore, RecordingEngine, SpeakConfig, SpeakService, SPEAK_LABEL_NAME,
};

fn sample_tsv() -> String {
    let mut tsv = String::from("!id\tSAMPLE\n!language\ten\n@Gen\tGenesis\tGen\n");
    for chapter in 1..=3 {
        for verse in 1..=10 {
            tsv.push_str(&format!("Gen.{chapter}.{verse}\tv\tGenesis verse {chapter} {verse}.\n"));
        }
    }
    tsv
}

fn gen(chapter: u16, verse: u16) -> VerseRef {
    VerseRef::new(0, chapter, verse)
}

fn auto_bookmarks() -> SpeakSettings {
    SpeakSettings {
        auto_bookmark: true,
        restore_settings_from_bookmarks: true,
        ..Default::default()
    }
}

fn service(
    settings: SpeakSettings,
) -> (SpeakService, EngineEvents, Arc<RecordingEngine>, Arc<MemoryBookmarkStore>) {
    let engine = Arc::new(RecordingEngine::new());
    let bookmarks = Arc::new(MemoryBookmarkStore::new());
    let (service, events) = SpeakService::new(
        engine.clone(),
        BibleSource::new(BibleText::from_tsv(&sample_tsv()).unwrap()),
        Arc::new(MemoryStore::new()),
        bookmarks.clone(),
        settings.shared(),
        SpeakConfig::default(),
    )
    .unwrap();
    (service, events, engine, bookmarks)
}

fn speaking_bookmarks(store: &MemoryBookmarkStore) -> Vec<Bookmark> {
    let label = store.speak_label().unwrap();
    store
        .bookmarks()
        .into_iter()
        .filter(|b| store.labels_for(b).unwrap().contains(&label))
        .collect()
}

#[test]
fn test_pausing_twice_keeps_one_bookmark() {
    let (service, mut events, _, bookmarks) = service(auto_bookmarks());
    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();

    service.pause(true);
    service.pause(true);

    let saved = speaking_bookmarks(&bookmarks);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].position, Position::Verse(gen(1, 1)));
    let playback = saved[0].playback_settings.as_ref().unwrap();
    assert_eq!(playback.book_id.as_deref(), Some("SAMPLE"));
    assert_eq!(playback.bookmark_was_created, Some(true));
}

#[test]
fn test_stop_moves_bookmark_to_new_position() {
    let (service, mut events, _, bookmarks) = service(auto_bookmarks());
    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();
    service.pause(true);
    service.continue_after_pause().unwrap();

    service.forward(RewindAmount::SmartUnit);
    service.stop(false);

    let saved = speaking_bookmarks(&bookmarks);
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].position, Position::Verse(gen(2, 1)));
    assert_eq!(bookmarks.bookmarks().len(), 1);
}

#[test]
fn test_no_bookmarks_without_auto_bookmark() {
    let (service, mut events, _, bookmarks) = service(SpeakSettings::default());
    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();
    service.pause(true);
    service.stop(false);
    assert!(bookmarks.bookmarks().is_empty());
}

#[test]
fn test_speaking_from_bookmark_adopts_its_settings() {
    let (service, mut events, engine, bookmarks) = service(auto_bookmarks());
    let mut bookmark = Bookmark::new(gen(1, 1));
    bookmark.playback_settings = Some(PlaybackSettings {
        speed: 150,
        book_id: Some("SAMPLE".into()),
        bookmark_was_created: Some(true),
        ..Default::default()
    });
    let bookmark = bookmarks.create_or_update(bookmark).unwrap();
    bookmarks
        .set_labels(&bookmark, &[bookmarks.speak_label().unwrap()])
        .unwrap();

    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();

    let adopted = service.settings().playback;
    assert_eq!(adopted.speed, 150);
    assert_eq!(adopted.book_id, None);
    assert_eq!(adopted.bookmark_was_created, None);
    assert!(engine.calls().contains(&EngineCall::SetSpeechRate(1.5)));
}

#[test]
fn test_settings_are_not_adopted_when_disabled() {
    let settings = SpeakSettings {
        auto_bookmark: true,
        ..Default::default()
    };
    let (service, mut events, _, bookmarks) = service(settings);
    let mut bookmark = Bookmark::new(gen(1, 1));
    bookmark.playback_settings = Some(PlaybackSettings {
        speed: 150,
        ..Default::default()
    });
    let bookmark = bookmarks.create_or_update(bookmark).unwrap();
    bookmarks
        .set_labels(&bookmark, &[bookmarks.speak_label().unwrap()])
        .unwrap();

    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();
    assert_eq!(service.settings().playback.speed, 100);
}

#[test]
fn test_unavailable_store_does_not_interrupt_playback() {
    let (service, mut events, _, bookmarks) = service(auto_bookmarks());
    bookmarks.set_unavailable(true);
    service.speak_bible("SAMPLE", gen(1, 1)).unwrap();
    events.drain();
    assert!(service.is_speaking());

    service.pause(true);
    assert!(service.is_paused());
    bookmarks.set_unavailable(false);
    assert!(bookmarks.bookmarks().is_empty());
}

#[test]
fn test_settings_update_keeps_bookkeeping() {
    let store = Arc::new(MemoryBookmarkStore::new());
    let mut sync = BookmarkSync::new(store.clone());
    sync.save(Position::Verse(gen(2, 3)), "KJV", &auto_bookmarks());

    let playback = PlaybackSettings {
        speed: 120,
        book_id: Some("OTHER".into()),
        ..Default::default()
    };
    sync.update_settings(&playback);

    let saved = store.bookmarks();
    assert_eq!(saved.len(), 1);
    let stored = saved[0].playback_settings.as_ref().unwrap();
    assert_eq!(stored.speed, 120);
    assert_eq!(stored.book_id.as_deref(), Some("KJV"));
    assert_eq!(stored.bookmark_was_created, Some(true));
}

#[test]
fn test_speak_label_is_reserved_name() {
    let store = MemoryBookmarkStore::new();
    let favourite = store.create_label("favourite");
    let label = store.speak_label().unwrap();
    assert_eq!(label.name, SPEAK_LABEL_NAME);
    assert_ne!(label.id, favourite.id);
}

fn document(id: &str) -> Arc<KeyDocument> {
    Arc::new(KeyDocument::from_plain_text(id, id, "# Start\nOpening words.\n\nMore words.\n").unwrap())
}

#[test]
fn test_key_bookmark_settings_stay_with_their_document() {
    let (service, mut events, _, bookmarks) = service(auto_bookmarks());
    let start = KeyRef::new(0, 0);
    let mut bookmark = Bookmark::in_document(start, "notes");
    bookmark.playback_settings = Some(PlaybackSettings {
        speed: 150,
        book_id: Some("notes".into()),
        bookmark_was_created: Some(true),
        ..Default::default()
    });
    let bookmark = bookmarks.create_or_update(bookmark).unwrap();
    bookmarks
        .set_labels(&bookmark, &[bookmarks.speak_label().unwrap()])
        .unwrap();

    service.speak_keys(document("diary"), KeyReading::from(start)).unwrap();
    events.drain();
    assert_eq!(service.settings().playback.speed, 100);

    service.speak_keys(document("notes"), KeyReading::from(start)).unwrap();
    events.drain();
    assert_eq!(service.settings().playback.speed, 150);
}

#[test]
fn test_pausing_two_documents_keeps_separate_bookmarks() {
    let start = Position::Key(KeyRef::new(0, 0));
    let store = Arc::new(MemoryBookmarkStore::new());
    let mut notes = BookmarkSync::new(store.clone());
    let mut diary = BookmarkSync::new(store.clone());
    notes.save(start, "notes", &auto_bookmarks());
    diary.save(start, "diary", &auto_bookmarks());

    let saved = speaking_bookmarks(&store);
    assert_eq!(saved.len(), 2);
    let mut owners: Vec<_> = saved
        .iter()
        .map(|b| {
            let book_id = b.playback_settings.as_ref().and_then(|p| p.book_id.clone());
            (b.document_id.clone(), book_id)
        })
        .collect();
    owners.sort();
    assert_eq!(
        owners,
        vec![
            (Some("diary".to_string()), Some("diary".to_string())),
            (Some("notes".to_string()), Some("notes".to_string())),
        ]
    );
}
