//! Loading and validating speech configuration

use std::sync::Arc;
use verbum_core::{Error as CoreError, MemoryStore, SpeakSettings};
use verbum_spk::{
    BibleSource, BibleText, MemoryBookmarkStore, Phrases, RecordingEngine, SpeakConfig, SpeakService, SpeechError,
    WraparoundPhrasing,
};

#[test]
fn test_defaults() {
    let config = SpeakConfig::default();
    assert_eq!(config.max_chunk_length, 4000);
    assert_eq!(config.lookahead_chunks, 10);
    assert_eq!(config.render_cache_size, 100);
    assert_eq!(config.silence_ms, 500);
    assert_eq!(config.utterance_prefix, "VERBUM-");
    assert_eq!(config.wraparound_phrasing, WraparoundPhrasing::Backward);
    assert!(config.validate().is_ok());
}

#[test]
fn test_from_toml_fills_missing_fields() {
    let config = SpeakConfig::from_toml_str(
        r#"
lookahead_chunks = 4
wraparound_phrasing = "forward"

[phrases]
chapter_changed = "{book}, chapter {chapter}."
"#,
    )
    .unwrap();
    assert_eq!(config.lookahead_chunks, 4);
    assert_eq!(config.wraparound_phrasing, WraparoundPhrasing::Forward);
    assert_eq!(config.phrases.chapter_changed, "{book}, chapter {chapter}.");
    assert_eq!(config.phrases.book_changed, Phrases::default().book_changed);
    assert_eq!(config.max_chunk_length, 4000);
}

#[test]
fn test_from_json() {
    let config = SpeakConfig::from_json_str(r#"{"silence_ms": 250, "default_locale": "de-DE"}"#).unwrap();
    assert_eq!(config.silence_ms, 250);
    assert_eq!(config.default_locale, "de-DE");
}

#[test]
fn test_invalid_values_are_rejected() {
    let cases = [
        r#"{"lookahead_chunks": 0}"#,
        r#"{"max_chunk_length": 8}"#,
        r#"{"earcon_volume": 1.5}"#,
        r#"{"utterance_prefix": "has space"}"#,
        r#"{"default_locale": "en US"}"#,
        r#"{"phrases": {"jumped": "  "}}"#,
    ];
    for case in cases {
        let err = SpeakConfig::from_json_str(case).unwrap_err();
        assert!(matches!(err, SpeechError::Config(_)), "{} gave {:?}", case, err);
    }
}

#[test]
fn test_malformed_input_is_a_core_error() {
    let err = SpeakConfig::from_toml_str("lookahead_chunks = [").unwrap_err();
    assert!(matches!(err, SpeechError::Core(CoreError::Configuration(_))));
}

#[test]
fn test_load_by_extension() {
    let dir = tempfile::tempdir().unwrap();

    let toml_path = dir.path().join("speak.toml");
    std::fs::write(&toml_path, "silence_ms = 100\n").unwrap();
    assert_eq!(SpeakConfig::load(&toml_path).unwrap().silence_ms, 100);

    let json_path = dir.path().join("speak.json");
    std::fs::write(&json_path, r#"{"silence_ms": 200}"#).unwrap();
    assert_eq!(SpeakConfig::load(&json_path).unwrap().silence_ms, 200);

    assert!(SpeakConfig::load(dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_settings_round_trip_through_toml() {
    let mut settings = SpeakSettings::default();
    settings.playback.speed = 130;
    settings.auto_bookmark = true;
    let text = toml::to_string(&settings).unwrap();
    let parsed: SpeakSettings = toml::from_str(&text).unwrap();
    assert_eq!(parsed, settings);
}

#[test]
fn test_service_rejects_invalid_setup() {
    let bible = || BibleSource::new(BibleText::from_tsv("!id\tS\n@Gen\tGenesis\nGen.1.1\tv\tText.\n").unwrap());
    let invalid_config = SpeakConfig {
        lookahead_chunks: 0,
        ..SpeakConfig::default()
    };
    let result = SpeakService::new(
        Arc::new(RecordingEngine::new()),
        bible(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBookmarkStore::new()),
        SpeakSettings::default().shared(),
        invalid_config,
    );
    assert!(matches!(result, Err(SpeechError::Config(_))));

    let invalid_settings = SpeakSettings {
        restore_settings_from_bookmarks: true,
        ..SpeakSettings::default()
    };
    let result = SpeakService::new(
        Arc::new(RecordingEngine::new()),
        bible(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBookmarkStore::new()),
        invalid_settings.shared(),
        SpeakConfig::default(),
    );
    assert!(matches!(result, Err(SpeechError::Config(_))));
}
