//! User-facing narration settings
//!
//! These are supplied and mutated by the host. The speech layer only reads
//! them, except for the bookmark bookkeeping fields of [`PlaybackSettings`].

use crate::position::RangeLimit;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Settings shared between the host and the speech service
pub type SharedSettings = Arc<RwLock<SpeakSettings>>;

/// How far rewind and forward move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RewindAmount {
    /// Chapter (or key) start, or the last announced title
    #[default]
    SmartUnit,
    OneStep,
    TenSteps,
    None,
}

/// Settings that travel with an auto-bookmark
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    /// Announce chapter (or key) changes
    pub speak_chapter_changes: bool,

    /// Speak section titles, preceded by an earcon
    pub speak_titles: bool,

    /// Speak footnotes between earcons
    pub speak_footnotes: bool,

    /// Speech rate in percent, 100 = normal
    pub speed: u32,

    /// Optional range limit; playback loops inside it
    pub range: Option<RangeLimit>,

    /// Start over at the session start after the session end
    pub repeat: bool,

    /// Document the settings were saved with
    pub book_id: Option<String>,

    /// Whether the bookmark holding these settings was created by playback
    pub bookmark_was_created: Option<bool>,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            speak_chapter_changes: true,
            speak_titles: true,
            speak_footnotes: false,
            speed: 100,
            range: None,
            repeat: false,
            book_id: None,
            bookmark_was_created: None,
        }
    }
}

impl PlaybackSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.speed == 0 {
            return Err("Speed must be greater than 0".to_string());
        }

        if self.speed > 400 {
            return Err("Speed too large (max 400 percent)".to_string());
        }

        if let Some(ref book_id) = self.book_id {
            if book_id.is_empty() {
                return Err("Book id cannot be empty if provided".to_string());
            }
            if book_id.chars().any(|c| c == '\0' || c.is_control()) {
                return Err("Book id contains invalid characters".to_string());
            }
        }

        if let Some(range) = self.range {
            if std::mem::discriminant(&range.start) != std::mem::discriminant(&range.end) {
                return Err("Range start and end must be the same kind of position".to_string());
            }
        }

        Ok(())
    }

    /// Engine speech rate, 1.0 = normal
    pub fn speech_rate(&self) -> f32 {
        self.speed as f32 / 100.0
    }

    /// Copy of these settings without the bookmark bookkeeping fields
    pub fn without_bookmark_fields(&self) -> Self {
        Self {
            book_id: None,
            bookmark_was_created: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeakSettings {
    pub playback: PlaybackSettings,

    /// Keep an auto-bookmark at the reading position
    pub auto_bookmark: bool,

    /// Adopt playback settings saved in a bookmark found at the start position
    pub restore_settings_from_bookmarks: bool,

    /// Let the host follow the reading position on screen
    pub synchronize: bool,

    pub rewind_amount: RewindAmount,
}

impl Default for SpeakSettings {
    fn default() -> Self {
        Self {
            playback: PlaybackSettings::default(),
            auto_bookmark: false,
            restore_settings_from_bookmarks: false,
            synchronize: true,
            rewind_amount: RewindAmount::SmartUnit,
        }
    }
}

impl SpeakSettings {
    pub fn validate(&self) -> Result<(), String> {
        self.playback.validate()?;

        if self.restore_settings_from_bookmarks && !self.auto_bookmark {
            return Err("Restoring settings from bookmarks requires auto bookmarks".to_string());
        }

        Ok(())
    }

    pub fn shared(self) -> SharedSettings {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::{KeyRef, VerseRef};

    #[test]
    fn test_defaults_validate() {
        assert!(SpeakSettings::default().validate().is_ok());
        assert_eq!(SpeakSettings::default().playback.speech_rate(), 1.0);
    }

    #[test]
    fn test_invalid_speed() {
        let mut settings = PlaybackSettings::default();
        settings.speed = 0;
        assert!(settings.validate().is_err());
        settings.speed = 401;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_mixed_range_rejected() {
        let settings = PlaybackSettings {
            range: Some(RangeLimit::new(VerseRef::new(0, 1, 1), KeyRef::new(0, 0))),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_restore_requires_auto_bookmark() {
        let settings = SpeakSettings {
            restore_settings_from_bookmarks: true,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: SpeakSettings =
            serde_json::from_str(r#"{"auto_bookmark": true, "playback": {"speed": 150}}"#).unwrap();
        assert!(settings.auto_bookmark);
        assert_eq!(settings.playback.speed, 150);
        assert!(settings.playback.speak_chapter_changes);
        assert_eq!(settings.rewind_amount, RewindAmount::SmartUnit);
    }
}
