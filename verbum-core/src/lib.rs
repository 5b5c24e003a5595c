pub mod config;
pub mod document;
pub mod error;
pub mod position;
pub mod settings;
pub mod store;
pub mod versification;

pub use config::{load_config, parse_config, parse_config_any, ConfigFormat};
pub use document::{DocumentKey, KeyDocument};
pub use error::{Error, Result};
pub use position::{clamp_to_range, Boundary, KeyRef, Position, PositionRange, RangeLimit, Unit, VerseRef};
pub use settings::{PlaybackSettings, RewindAmount, SharedSettings, SpeakSettings};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
pub use versification::{BookInfo, Versification};
