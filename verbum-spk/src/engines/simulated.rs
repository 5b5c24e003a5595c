//! Engine that "speaks" by waiting, for demos and soak runs

use crate::commands::Earcon;
use crate::engines::{EngineEvent, EngineSink, LanguageStatus, SynthesisEngine};
use crate::error::{Result, SpeechError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Timing of the simulated voice
#[derive(Debug, Clone)]
pub struct SimulatedEngineConfig {
    /// Characters spoken per second at rate 1.0
    pub chars_per_second: f64,
    /// Length of every earcon
    pub earcon_ms: u64,
    /// Languages reported as available; empty accepts everything
    pub languages: Vec<String>,
}

impl Default for SimulatedEngineConfig {
    fn default() -> Self {
        Self {
            chars_per_second: 16.0,
            earcon_ms: 300,
            languages: Vec::new(),
        }
    }
}

type Printer = Arc<dyn Fn(&str) + Send + Sync>;

struct Utterance {
    id: String,
    text: Option<String>,
    duration: Duration,
    epoch: u64,
}

struct Worker {
    requests: mpsc::UnboundedSender<Utterance>,
    task: tokio::task::JoinHandle<()>,
}

/// Plays utterances one after another on a tokio task, sleeping for the
/// time the text would take to say. `flush` and `stop` bump an epoch so
/// queued utterances of the old epoch are skipped without callbacks.
pub struct SimulatedEngine {
    config: SimulatedEngineConfig,
    rate: Mutex<f32>,
    epoch: Arc<AtomicU64>,
    worker: Mutex<Option<Worker>>,
    printer: Option<Printer>,
}

impl SimulatedEngine {
    pub fn new(config: SimulatedEngineConfig) -> Self {
        Self {
            config,
            rate: Mutex::new(1.0),
            epoch: Arc::new(AtomicU64::new(0)),
            worker: Mutex::new(None),
            printer: None,
        }
    }

    /// Call `printer` with every text as it starts playing
    pub fn with_printer<F>(mut self, printer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.printer = Some(Arc::new(printer));
        self
    }

    fn text_duration(&self, text: &str) -> Duration {
        let rate = (*self.rate.lock()).max(0.1) as f64;
        let secs = text.chars().count() as f64 / (self.config.chars_per_second * rate);
        Duration::from_secs_f64(secs)
    }

    fn submit(&self, id: &str, text: Option<String>, duration: Duration) -> Result<()> {
        let worker = self.worker.lock();
        let worker = worker
            .as_ref()
            .ok_or_else(|| SpeechError::Engine("Simulated engine is not initialized".to_string()))?;
        worker
            .requests
            .send(Utterance {
                id: id.to_string(),
                text,
                duration,
                epoch: self.epoch.load(Ordering::SeqCst),
            })
            .map_err(|_| SpeechError::Engine("Simulated engine worker stopped".to_string()))
    }

    async fn play(
        mut requests: mpsc::UnboundedReceiver<Utterance>,
        sink: EngineSink,
        epoch: Arc<AtomicU64>,
        printer: Option<Printer>,
    ) {
        while let Some(utterance) = requests.recv().await {
            if utterance.epoch != epoch.load(Ordering::SeqCst) {
                continue;
            }
            if sink.send(EngineEvent::Started(utterance.id.clone())).is_err() {
                break;
            }
            if let (Some(printer), Some(text)) = (printer.as_ref(), utterance.text.as_deref()) {
                printer(text);
            }
            tokio::time::sleep(utterance.duration).await;
            // flushed while playing: the utterance was cut short
            if utterance.epoch != epoch.load(Ordering::SeqCst) {
                continue;
            }
            if sink.send(EngineEvent::Done(utterance.id)).is_err() {
                break;
            }
        }
        debug!("Simulated engine worker finished");
    }
}

impl SynthesisEngine for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn initialize(&self, sink: EngineSink) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SpeechError::Engine("No tokio runtime available. The simulated engine needs one.".to_string())
        })?;

        let (requests, receiver) = mpsc::unbounded_channel();
        let task = handle.spawn(Self::play(receiver, sink.clone(), self.epoch.clone(), self.printer.clone()));
        if let Some(old) = self.worker.lock().replace(Worker { requests, task }) {
            old.task.abort();
        }
        info!("Simulated engine initialized");
        let _ = sink.send(EngineEvent::Initialized(Ok(())));
        Ok(())
    }

    fn shutdown(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            worker.task.abort();
        }
        info!("Simulated engine shut down");
    }

    fn add_earcon(&self, earcon: Earcon, resource: &str) -> Result<()> {
        debug!("Earcon {} uses {}", earcon.id(), resource);
        Ok(())
    }

    fn set_language(&self, locale: &str) -> LanguageStatus {
        if self.config.languages.is_empty() {
            return LanguageStatus::Available;
        }
        let language = locale.split(|c| c == '-' || c == '_').next().unwrap_or(locale);
        if self
            .config
            .languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(locale) || l.eq_ignore_ascii_case(language))
        {
            LanguageStatus::Available
        } else {
            warn!("Simulated engine has no voice for {}", locale);
            LanguageStatus::NotSupported
        }
    }

    fn set_speech_rate(&self, rate: f32) -> Result<()> {
        if !(rate > 0.0 && rate <= 4.0) {
            return Err(SpeechError::Engine(format!("Speech rate {} out of range", rate)));
        }
        *self.rate.lock() = rate;
        Ok(())
    }

    fn speak(&self, text: &str, utterance_id: &str) -> Result<()> {
        let duration = self.text_duration(text);
        self.submit(utterance_id, Some(text.to_string()), duration)
    }

    fn play_earcon(&self, earcon: Earcon, _volume: f32, utterance_id: &str) -> Result<()> {
        debug!("Playing earcon {}", earcon.id());
        self.submit(utterance_id, None, Duration::from_millis(self.config.earcon_ms))
    }

    fn play_silence(&self, duration_ms: u32, utterance_id: &str) -> Result<()> {
        self.submit(utterance_id, None, Duration::from_millis(duration_ms as u64))
    }

    fn stop(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn max_input_length(&self) -> Option<usize> {
        Some(4000)
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::engine_channel;

    fn fast() -> SimulatedEngineConfig {
        SimulatedEngineConfig {
            chars_per_second: 1000.0,
            earcon_ms: 5,
            languages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_utterances_complete_in_order() {
        let engine = SimulatedEngine::new(fast());
        let (sink, mut events) = engine_channel();
        engine.initialize(sink).unwrap();
        assert_eq!(events.recv().await, Some(EngineEvent::Initialized(Ok(()))));

        engine.speak("Hello there.", "a").unwrap();
        engine.play_silence(10, "b").unwrap();

        assert_eq!(events.recv().await, Some(EngineEvent::Started("a".into())));
        assert_eq!(events.recv().await, Some(EngineEvent::Done("a".into())));
        assert_eq!(events.recv().await, Some(EngineEvent::Started("b".into())));
        assert_eq!(events.recv().await, Some(EngineEvent::Done("b".into())));
    }

    #[tokio::test]
    async fn test_flush_drops_queued_utterances() {
        let engine = SimulatedEngine::new(fast());
        let (sink, mut events) = engine_channel();
        engine.initialize(sink).unwrap();
        let _ = events.recv().await;

        engine.speak("this will be flushed", "old").unwrap();
        engine.flush().unwrap();
        engine.speak("fresh", "new").unwrap();

        let mut seen = vec![];
        while let Some(event) = events.recv().await {
            let done = event == EngineEvent::Done("new".into());
            seen.push(event);
            if done {
                break;
            }
        }
        assert!(!seen.contains(&EngineEvent::Done("old".into())));
    }

    #[test]
    fn test_initialize_needs_runtime() {
        let engine = SimulatedEngine::new(SimulatedEngineConfig::default());
        let (sink, _events) = engine_channel();
        assert!(engine.initialize(sink).is_err());
    }

    #[test]
    fn test_language_filter() {
        let engine = SimulatedEngine::new(SimulatedEngineConfig {
            languages: vec!["en".into()],
            ..Default::default()
        });
        assert_eq!(engine.set_language("en-GB"), LanguageStatus::Available);
        assert_eq!(engine.set_language("fi-FI"), LanguageStatus::NotSupported);
    }
}
