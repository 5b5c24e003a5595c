// Key-value store keys owned by the speech layer

/// Document of the paused Bible session
pub const SPEAK_BIBLE_BOOK: &str = "SpeakBibleBook";
/// OSIS reference of the paused Bible session
pub const SPEAK_BIBLE_VERSE: &str = "SpeakBibleVerse";
/// Document of the paused keyed session
pub const SPEAK_KEY_DOCUMENT: &str = "SpeakKeyDocument";
/// Paragraph reference of the paused keyed session
pub const SPEAK_KEY_POSITION: &str = "SpeakKeyPosition";
/// Locale in use when the session was paused
pub const SPEAK_LOCALE: &str = "SpeakLocale";
/// Kind of provider that was active when paused
pub const SPEAK_PROVIDER: &str = "SpeakBibleProvider";
pub const SPEAK_CHARS_PER_MS: &str = "SpeakCharsPerMs";
/// Comma separated locales known to work
pub const SPEAK_SUPPORTED_LOCALES: &str = "SpeakSupportedLocales";
/// Comma separated locales known to fail
pub const SPEAK_UNSUPPORTED_LOCALES: &str = "SpeakUnsupportedLocales";

pub const PROVIDER_BIBLE: &str = "bible";
pub const PROVIDER_KEYS: &str = "keys";
