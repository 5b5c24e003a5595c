//! Configuration for speech orchestration

use crate::error::{Result, SpeechError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use verbum_core::{load_config, parse_config, ConfigFormat};

/// Speech orchestration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakConfig {
    /// Longest text chunk the engine accepts (default 4000)
    pub max_chunk_length: usize,

    /// Chunks handed to the engine per refill (default 10)
    pub lookahead_chunks: usize,

    /// Rendered units kept per provider (default 100)
    pub render_cache_size: usize,

    /// Length of an enabled silence in milliseconds (default 500)
    pub silence_ms: u32,

    /// Earcon playback volume (0.0-1.0, default 0.2)
    pub earcon_volume: f32,

    /// Prefix of chunk ids handed to the engine
    pub utterance_prefix: String,

    /// System locale, used first when it matches the content language
    pub default_locale: String,

    /// Announcement phrasing
    pub phrases: Phrases,

    /// How a repeat-range wrap is announced
    pub wraparound_phrasing: WraparoundPhrasing,
}

/// Announcement used when a repeat range starts over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WraparoundPhrasing {
    /// Same as any backward jump
    #[default]
    Backward,
    /// Same as a natural chapter or book change
    Forward,
}

/// Localizable announcement templates. `{book}`, `{chapter}` and `{key}`
/// are substituted when the announcement is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Phrases {
    pub book_changed: String,
    pub chapter_changed: String,
    pub jumped: String,
    pub key_changed: String,
    pub key_jumped: String,
    /// Words replacing "1." to "5." in spoken book names
    pub ordinals: Vec<String>,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            book_changed: "Book changed. {book} Chapter {chapter}.".to_string(),
            chapter_changed: "{book} Chapter {chapter}.".to_string(),
            jumped: "{book} Chapter {chapter}.".to_string(),
            key_changed: "{key}.".to_string(),
            key_jumped: "{key}.".to_string(),
            ordinals: ["First", "Second", "Third", "Fourth", "Fifth"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Phrases {
    pub fn validate(&self) -> std::result::Result<(), String> {
        for (name, template) in [
            ("book_changed", &self.book_changed),
            ("chapter_changed", &self.chapter_changed),
            ("jumped", &self.jumped),
            ("key_changed", &self.key_changed),
            ("key_jumped", &self.key_jumped),
        ] {
            if template.trim().is_empty() {
                return Err(format!("Phrase {} cannot be empty", name));
            }
            if template.len() > 512 {
                return Err(format!("Phrase {} too long (max 512 chars)", name));
            }
        }

        if self.ordinals.len() > 5 {
            return Err("At most 5 ordinal words are supported".to_string());
        }

        Ok(())
    }

    /// Book name as it should be spoken: "1. Moses" becomes "First Moses"
    pub fn spoken_book_name(&self, name: &str) -> String {
        for (i, word) in self.ordinals.iter().enumerate() {
            let prefix = format!("{}.", i + 1);
            if let Some(rest) = name.strip_prefix(&prefix) {
                return format!("{} {}", word, rest.trim_start());
            }
        }
        name.to_string()
    }

    pub fn render(template: &str, book: &str, chapter: u32, key: &str) -> String {
        template
            .replace("{book}", book)
            .replace("{chapter}", &chapter.to_string())
            .replace("{key}", key)
    }
}

impl Default for SpeakConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: 4000,
            lookahead_chunks: 10,
            render_cache_size: 100,
            silence_ms: 500,
            earcon_volume: 0.2,
            utterance_prefix: "VERBUM-".to_string(),
            default_locale: "en-US".to_string(),
            phrases: Phrases::default(),
            wraparound_phrasing: WraparoundPhrasing::Backward,
        }
    }
}

impl SpeakConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_chunk_length < 16 {
            return Err("Max chunk length too small (min 16)".to_string());
        }

        if self.max_chunk_length > 100_000 {
            return Err("Max chunk length too large (max 100000)".to_string());
        }

        if self.lookahead_chunks == 0 {
            return Err("Lookahead must be at least 1 chunk".to_string());
        }

        if self.lookahead_chunks > 1000 {
            return Err("Lookahead too large (max 1000 chunks)".to_string());
        }

        if self.render_cache_size == 0 {
            return Err("Render cache size must be greater than 0".to_string());
        }

        if self.silence_ms > 10_000 {
            return Err("Silence too long (max 10000 ms)".to_string());
        }

        if !(0.0..=1.0).contains(&self.earcon_volume) || self.earcon_volume.is_nan() {
            return Err("Earcon volume must be between 0.0 and 1.0".to_string());
        }

        if self.utterance_prefix.is_empty() {
            return Err("Utterance prefix cannot be empty".to_string());
        }

        if self.utterance_prefix.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err("Utterance prefix contains invalid characters".to_string());
        }

        if !self
            .default_locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            || self.default_locale.is_empty()
        {
            return Err("Default locale must look like \"en\" or \"en-US\"".to_string());
        }

        self.phrases.validate()
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::checked(parse_config(content, ConfigFormat::Toml)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::checked(parse_config(content, ConfigFormat::Json)?)
    }

    /// Load from a `.toml` or `.json` file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::checked(load_config(path)?)
    }

    fn checked(config: Self) -> Result<Self> {
        config.validate().map_err(SpeechError::Config)?;
        Ok(config)
    }
}
