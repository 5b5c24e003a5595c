//! Concurrent use of the speech service

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_test::assert_ok;
use verbum_core::{KeyDocument, KeyRef, MemoryStore, RewindAmount, SpeakSettings, VerseRef};
use verbum_spk::{
    BibleSource, BibleText, ChunkId, KeyReading, MemoryBookmarkStore, RecordingEngine, SimulatedEngine,
    SimulatedEngineConfig, SpeakConfig, SpeakEvent, SpeakService, SpeakState, SynthesisEngine, SHOW_ALL,
};

fn sample_bible() -> BibleSource {
    let mut tsv = String::from("!id\tSAMPLE\n!language\ten\n@Gen\tGenesis\tGen\n");
    for chapter in 1..=3 {
        for verse in 1..=10 {
            tsv.push_str(&format!("Gen.{chapter}.{verse}\tv\tGenesis verse {chapter} {verse}.\n"));
        }
    }
    BibleSource::new(BibleText::from_tsv(&tsv).unwrap())
}

fn notes() -> Arc<KeyDocument> {
    Arc::new(
        KeyDocument::from_plain_text(
            "notes",
            "Notes",
            "# Intro\nThe first paragraph is here.\n\nThe second paragraph follows.\n\nThe third one ends it.\n",
        )
        .unwrap(),
    )
}

fn new_service(engine: Arc<dyn SynthesisEngine>, config: SpeakConfig) -> (SpeakService, verbum_spk::EngineEvents) {
    SpeakService::new(
        engine,
        sample_bible(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBookmarkStore::new()),
        SpeakSettings::default().shared(),
        config,
    )
    .unwrap()
}

fn simulated(chars_per_second: f64) -> Arc<SimulatedEngine> {
    Arc::new(SimulatedEngine::new(SimulatedEngineConfig {
        chars_per_second,
        earcon_ms: 1,
        languages: Vec::new(),
    }))
}

fn quick_config() -> SpeakConfig {
    SpeakConfig {
        silence_ms: 1,
        lookahead_chunks: 3,
        ..SpeakConfig::default()
    }
}

async fn wait_for(events: &mut broadcast::Receiver<SpeakEvent>, matches: impl Fn(&SpeakEvent) -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for event");
}

fn is_state(state: SpeakState) -> impl Fn(&SpeakEvent) -> bool {
    move |event| *event == SpeakEvent::State { state }
}

#[test]
fn test_clones_drive_one_playback_from_many_threads() {
    let engine = Arc::new(RecordingEngine::new());
    let (service, mut events) = new_service(engine.clone(), SpeakConfig::default());
    service.speak_bible("SAMPLE", VerseRef::new(0, 1, 1)).unwrap();
    events.drain();

    let finished = AtomicBool::new(false);
    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let service = service.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        match (worker + i) % 5 {
                            0 => service.pause(true),
                            1 => assert_ok!(service.continue_after_pause()),
                            2 => service.rewind(RewindAmount::OneStep),
                            3 => service.forward(RewindAmount::OneStep),
                            _ => {
                                let _ = service.status_text(SHOW_ALL);
                            }
                        }
                    }
                })
            })
            .collect();

        let engine = engine.clone();
        let events = &mut events;
        let finished = &finished;
        scope.spawn(move || {
            while !finished.load(Ordering::SeqCst) {
                engine.complete_next();
                events.drain();
                std::thread::yield_now();
            }
        });

        for worker in workers {
            worker.join().unwrap();
        }
        finished.store(true, Ordering::SeqCst);
    });

    events.drain();
    assert_ok!(service.continue_after_pause());
    events.drain();
    assert!(service.is_speaking());

    // the engine only ever holds chunks of the latest generation
    let generations: Vec<u64> = engine
        .queued()
        .iter()
        .filter_map(|call| call.utterance_id())
        .filter_map(|id| ChunkId::parse("VERBUM-", id))
        .map(|id| id.generation)
        .collect();
    assert!(!generations.is_empty());
    assert!(generations.iter().all(|g| *g == generations[0]));

    service.stop(false);
    assert_eq!(service.state(), SpeakState::Silent);
}

#[tokio::test]
async fn test_simulated_engine_reads_to_hard_stop() {
    let (service, engine_events) = new_service(simulated(10_000.0), quick_config());
    let mut events = service.subscribe_events();
    let pump = tokio::spawn(engine_events.run());

    let reading = KeyReading::from(KeyRef::new(0, 0)).until(KeyRef::new(0, 2));
    service.speak_keys(notes(), reading).unwrap();

    wait_for(&mut events, is_state(SpeakState::Speaking)).await;
    wait_for(&mut events, is_state(SpeakState::Silent)).await;
    assert_eq!(service.state(), SpeakState::Silent);
    pump.abort();
}

#[tokio::test]
async fn test_pause_and_continue_with_async_callbacks() {
    let (service, engine_events) = new_service(simulated(200.0), quick_config());
    let mut events = service.subscribe_events();
    let pump = tokio::spawn(engine_events.run());

    let reading = KeyReading::from(KeyRef::new(0, 0)).until(KeyRef::new(0, 2));
    service.speak_keys(notes(), reading).unwrap();
    wait_for(&mut events, |event| matches!(event, SpeakEvent::Progress(_))).await;

    service.pause(true);
    assert!(service.is_paused());

    service.continue_after_pause().unwrap();
    assert!(service.is_speaking());
    wait_for(&mut events, is_state(SpeakState::Silent)).await;
    pump.abort();
}

#[tokio::test]
async fn test_event_pump_stops_with_the_service() {
    let (service, engine_events) = new_service(simulated(10_000.0), quick_config());
    let pump = tokio::spawn(engine_events.run());
    service.speak_bible("SAMPLE", VerseRef::new(0, 1, 1)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    service.stop(false);
    drop(service);
    // the channel closes once the service and its engine are gone
    let finished = tokio::time::timeout(Duration::from_secs(5), pump).await;
    assert!(finished.is_ok());
}
