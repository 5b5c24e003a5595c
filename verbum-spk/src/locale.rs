//! Locale selection for the synthesis engine

use crate::persist::{SPEAK_SUPPORTED_LOCALES, SPEAK_UNSUPPORTED_LOCALES};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use verbum_core::KeyValueStore;

/// Language with an optional region, rendered as "en-GB"
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Locale {
    pub language: String,
    pub country: Option<String>,
}

impl Locale {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into().to_ascii_lowercase(),
            country: None,
        }
    }

    pub fn with_country(language: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            language: language.into().to_ascii_lowercase(),
            country: Some(country.into().to_ascii_uppercase()),
        }
    }

    /// Parse "en", "en-GB" or "en_GB"
    pub fn parse(tag: &str) -> Option<Self> {
        let mut parts = tag.trim().split(|c| c == '-' || c == '_');
        let language = parts.next().filter(|l| !l.is_empty())?;
        if !language.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        match parts.next() {
            Some(country) if !country.is_empty() => Some(Self::with_country(language, country)),
            _ => Some(Self::new(language)),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.country {
            Some(country) => write!(f, "{}-{}", self.language, country),
            None => write!(f, "{}", self.language),
        }
    }
}

/// Region to try first for a bare content language
pub fn default_country(language: &str) -> Option<&'static str> {
    Some(match language {
        "en" => "GB",
        "fr" => "FR",
        "de" => "DE",
        "zh" => "CN",
        "it" => "IT",
        "jp" => "JP",
        "ko" => "KR",
        "hu" => "HU",
        "cs" => "CZ",
        "fi" => "FI",
        "pl" => "PL",
        "pt" => "PT",
        "ru" => "RU",
        "tr" => "TR",
        _ => return None,
    })
}

/// Locales to try for content in `language`, best first: the system
/// locale when it speaks the same language, the language's home region,
/// then the bare language. Ancient Greek is read with modern Greek.
pub fn preference_list(language: &str, system: &Locale) -> Vec<Locale> {
    let mut language = language.trim().to_ascii_lowercase();
    let mut locales = Vec::new();

    if language == system.language {
        locales.push(system.clone());
    }

    if let Some(country) = default_country(&language) {
        let regional = Locale::with_country(language.as_str(), country);
        if !locales.contains(&regional) {
            locales.push(regional);
        }
    }

    if language == "grc" {
        language = "el".to_string();
    }
    let bare = Locale::new(language);
    if !locales.contains(&bare) {
        locales.push(bare);
    }
    locales
}

/// Remembers which locales the engine accepted or refused, across sessions
pub struct LanguageSupport {
    supported: BTreeSet<String>,
    unsupported: BTreeSet<String>,
    store: Arc<dyn KeyValueStore>,
}

fn read_set(store: &dyn KeyValueStore, key: &str) -> BTreeSet<String> {
    store
        .get_string(key)
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl LanguageSupport {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let supported = read_set(store.as_ref(), SPEAK_SUPPORTED_LOCALES);
        let unsupported = read_set(store.as_ref(), SPEAK_UNSUPPORTED_LOCALES);
        Self {
            supported,
            unsupported,
            store,
        }
    }

    pub fn add_supported(&mut self, locale: &Locale) {
        let tag = locale.to_string();
        self.unsupported.remove(&tag);
        if self.supported.insert(tag) {
            self.save();
        }
    }

    pub fn add_unsupported(&mut self, locale: &Locale) {
        let tag = locale.to_string();
        self.supported.remove(&tag);
        if self.unsupported.insert(tag) {
            self.save();
        }
    }

    pub fn is_known_unsupported(&self, locale: &Locale) -> bool {
        self.unsupported.contains(&locale.to_string())
    }

    /// True when some locale of `language` worked before
    pub fn is_language_known_supported(&self, language: &str) -> bool {
        let language = language.trim().to_ascii_lowercase();
        self.supported.iter().any(|tag| {
            Locale::parse(tag)
                .map(|l| l.language == language)
                .unwrap_or(false)
        })
    }

    /// Drop known-bad locales from a preference list. When every candidate
    /// failed before they are all kept, so the engine gets another chance.
    pub fn filter_candidates(&self, candidates: Vec<Locale>) -> Vec<Locale> {
        let filtered: Vec<Locale> = candidates
            .iter()
            .filter(|l| !self.is_known_unsupported(l))
            .cloned()
            .collect();
        if filtered.is_empty() {
            debug!("All candidate locales failed before, retrying all of them");
            candidates
        } else {
            filtered
        }
    }

    fn save(&self) {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(",");
        if let Err(e) = self.store.set_string(SPEAK_SUPPORTED_LOCALES, &join(&self.supported)) {
            warn!("Failed to persist supported locales: {}", e);
        }
        if let Err(e) = self.store.set_string(SPEAK_UNSUPPORTED_LOCALES, &join(&self.unsupported)) {
            warn!("Failed to persist unsupported locales: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verbum_core::MemoryStore;

    #[test]
    fn test_preference_list_for_system_language() {
        let list = preference_list("en", &Locale::with_country("en", "US"));
        let tags: Vec<String> = list.iter().map(|l| l.to_string()).collect();
        assert_eq!(tags, vec!["en-US", "en-GB", "en"]);
    }

    #[test]
    fn test_preference_list_for_foreign_language() {
        let list = preference_list("fi", &Locale::with_country("en", "US"));
        let tags: Vec<String> = list.iter().map(|l| l.to_string()).collect();
        assert_eq!(tags, vec!["fi-FI", "fi"]);
    }

    #[test]
    fn test_ancient_greek_reads_as_modern_greek() {
        let list = preference_list("grc", &Locale::new("en"));
        assert_eq!(list, vec![Locale::new("el")]);
    }

    #[test]
    fn test_locale_parse() {
        assert_eq!(Locale::parse("en_GB"), Some(Locale::with_country("en", "GB")));
        assert_eq!(Locale::parse("de"), Some(Locale::new("de")));
        assert_eq!(Locale::parse(""), None);
        assert_eq!(Locale::parse("1x"), None);
    }

    #[test]
    fn test_support_memory_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut support = LanguageSupport::new(store.clone());
        support.add_supported(&Locale::with_country("en", "GB"));
        support.add_unsupported(&Locale::new("xx"));

        let support = LanguageSupport::new(store);
        assert!(support.is_language_known_supported("en"));
        assert!(!support.is_language_known_supported("xx"));
        assert!(support.is_known_unsupported(&Locale::new("xx")));
    }

    #[test]
    fn test_filter_keeps_everything_when_all_failed() {
        let mut support = LanguageSupport::new(Arc::new(MemoryStore::new()));
        support.add_unsupported(&Locale::with_country("fi", "FI"));
        let list = preference_list("fi", &Locale::new("en"));
        assert_eq!(support.filter_candidates(list.clone()), vec![Locale::new("fi")]);
        support.add_unsupported(&Locale::new("fi"));
        assert_eq!(support.filter_candidates(list.clone()), list);
    }
}
