//! Speaking speed estimate used for pause position and remaining time

use crate::persist::SPEAK_CHARS_PER_MS;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use verbum_core::KeyValueStore;

/// Chars per millisecond assumed before anything was measured
pub const DEFAULT_CHARS_PER_MS: f64 = 0.016;

const MIN_CHARS_FOR_ESTIMATE: usize = 100;
const MIN_DURATION_FOR_ESTIMATE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct Started {
    utterance_id: String,
    chars: usize,
    at: Instant,
}

/// Tracks the chunk being spoken and keeps a running chars-per-ms
/// average, persisted between sessions.
pub struct SpeakTiming {
    chars_per_ms: f64,
    last: Option<Started>,
    store: Arc<dyn KeyValueStore>,
}

impl SpeakTiming {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let chars_per_ms = store
            .get_double(SPEAK_CHARS_PER_MS)
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_CHARS_PER_MS);
        debug!("Speak timing starts at {} chars/ms", chars_per_ms);
        Self {
            chars_per_ms,
            last: None,
            store,
        }
    }

    pub fn chars_per_ms(&self) -> f64 {
        self.chars_per_ms
    }

    pub fn started(&mut self, utterance_id: &str, chars: usize) {
        self.started_at(utterance_id, chars, Instant::now());
    }

    pub fn started_at(&mut self, utterance_id: &str, chars: usize, at: Instant) {
        self.last = Some(Started {
            utterance_id: utterance_id.to_string(),
            chars,
            at,
        });
    }

    pub fn finished(&mut self, utterance_id: &str) {
        self.finished_at(utterance_id, Instant::now());
    }

    /// Update the estimate when the finished chunk is the one last started
    /// and long enough to give a meaningful reading.
    pub fn finished_at(&mut self, utterance_id: &str, at: Instant) {
        let Some(last) = self.last.as_ref() else {
            return;
        };
        if last.utterance_id != utterance_id {
            return;
        }
        let elapsed = at.saturating_duration_since(last.at);
        if last.chars >= MIN_CHARS_FOR_ESTIMATE && elapsed >= MIN_DURATION_FOR_ESTIMATE {
            let measured = last.chars as f64 / elapsed.as_millis() as f64;
            self.chars_per_ms = (self.chars_per_ms + measured) / 2.0;
            debug!("Measured {} chars/ms, estimate now {}", measured, self.chars_per_ms);
            if let Err(e) = self.store.set_double(SPEAK_CHARS_PER_MS, self.chars_per_ms) {
                warn!("Failed to persist speaking speed: {}", e);
            }
        }
        self.last = None;
    }

    pub fn fraction_completed(&self) -> f64 {
        self.fraction_completed_at(Instant::now())
    }

    /// Estimated share of the current chunk already spoken, 0.0..=1.0
    pub fn fraction_completed_at(&self, at: Instant) -> f64 {
        match &self.last {
            Some(last) if last.chars > 0 => {
                let elapsed = at.saturating_duration_since(last.at).as_millis() as f64;
                let expected = last.chars as f64 / self.chars_per_ms;
                (elapsed / expected).clamp(0.0, 1.0)
            }
            _ => 0.0,
        }
    }

    pub fn secs_for_chars(&self, chars: usize) -> u64 {
        (chars as f64 / self.chars_per_ms / 1000.0).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verbum_core::MemoryStore;

    #[test]
    fn test_short_chunks_do_not_move_estimate() {
        let store = Arc::new(MemoryStore::new());
        let mut timing = SpeakTiming::new(store.clone());
        let t0 = Instant::now();
        timing.started_at("a", 50, t0);
        timing.finished_at("a", t0 + Duration::from_secs(5));
        assert_eq!(timing.chars_per_ms(), DEFAULT_CHARS_PER_MS);
        assert!(store.get_double(SPEAK_CHARS_PER_MS).is_none());
    }

    #[test]
    fn test_estimate_is_averaged_and_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut timing = SpeakTiming::new(store.clone());
        let t0 = Instant::now();
        timing.started_at("a", 200, t0);
        timing.finished_at("a", t0 + Duration::from_millis(10_000));
        let expected = (DEFAULT_CHARS_PER_MS + 0.02) / 2.0;
        assert!((timing.chars_per_ms() - expected).abs() < 1e-12);
        assert_eq!(store.get_double(SPEAK_CHARS_PER_MS), Some(timing.chars_per_ms()));

        let reloaded = SpeakTiming::new(store);
        assert!((reloaded.chars_per_ms() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_other_chunk_finishing_is_ignored() {
        let mut timing = SpeakTiming::new(Arc::new(MemoryStore::new()));
        let t0 = Instant::now();
        timing.started_at("a", 500, t0);
        timing.finished_at("b", t0 + Duration::from_secs(3));
        assert_eq!(timing.chars_per_ms(), DEFAULT_CHARS_PER_MS);
        assert!(timing.fraction_completed_at(t0 + Duration::from_secs(3)) > 0.0);
    }

    #[test]
    fn test_fraction_and_secs() {
        let mut timing = SpeakTiming::new(Arc::new(MemoryStore::new()));
        let t0 = Instant::now();
        assert_eq!(timing.fraction_completed_at(t0), 0.0);
        // 160 chars take 10 s at the default speed
        timing.started_at("a", 160, t0);
        assert!((timing.fraction_completed_at(t0 + Duration::from_secs(5)) - 0.5).abs() < 1e-9);
        assert_eq!(timing.fraction_completed_at(t0 + Duration::from_secs(60)), 1.0);
        assert_eq!(timing.secs_for_chars(160), 10);
    }
}
