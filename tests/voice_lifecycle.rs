//! Voice lifecycle tests
//!
//! The per-voice re-scheduling contract: start, step evaluation,
//! stop-discard, live pattern swaps, and tempo changes mid-flight.

use livebeat::{
    ControlMessage, EngineConfig, LiveEngine, MessageSink, Pattern, QuantizePolicy, Step, Tempo,
    TimedMessage, TransportError, ValueSeq,
};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

struct CaptureSink {
    captured: Arc<Mutex<Vec<TimedMessage>>>,
}

impl MessageSink for CaptureSink {
    fn deliver(&mut self, message: &TimedMessage) -> Result<(), TransportError> {
        self.captured.lock().unwrap().push(message.clone());
        Ok(())
    }
}

fn capture_engine(bpm: f64) -> (LiveEngine, Arc<Mutex<Vec<TimedMessage>>>) {
    let mut config = EngineConfig::default();
    config.tempo_bpm = bpm;
    let captured = Arc::new(Mutex::new(Vec::new()));
    let engine = LiveEngine::start_with_sink(
        config,
        Box::new(CaptureSink {
            captured: Arc::clone(&captured),
        }),
    )
    .unwrap();
    (engine, captured)
}

fn decode(message: &TimedMessage) -> ControlMessage {
    serde_json::from_slice(&message.payload).unwrap()
}

/// A 4-step pattern with constant 1-beat durations produces exactly
/// 4 messages over 4 invocations and re-queues itself a 5th time.
#[test]
fn test_four_step_pattern_four_messages_then_requeue() {
    use livebeat::{BeatClock, JobContext, Meter, Notifier, Transport, Voice};

    let clock = Arc::new(BeatClock::new(Tempo::new(120.0), Meter::four_four()));
    let (ntx, _nrx) = livebeat::messaging::create_notification_channel(16);
    let notifier = Notifier::new(ntx);
    let captured = Arc::new(Mutex::new(Vec::new()));
    let mut transport = Transport::start(
        Box::new(CaptureSink {
            captured: Arc::clone(&captured),
        }),
        64,
        notifier.clone(),
    );
    let ctx = JobContext::new(Arc::clone(&clock), transport.link(), notifier);

    let voice = Voice::new(
        "arp",
        Pattern::from_notes("pluck", &[60.0, 64.0, 67.0, 72.0]),
    );

    let mut due = clock.now();
    for _ in 0..4 {
        let next = voice
            .invoke(due, &ctx)
            .unwrap()
            .expect("voice re-queues itself");
        // Constant 1-beat steps
        assert!((next - due - 1.0).abs() < 1e-9);
        due = next;
    }

    transport.shutdown();
    let captured = captured.lock().unwrap();
    assert_eq!(captured.len(), 4);
    let notes: Vec<f64> = captured.iter().map(|m| decode(m).note).collect();
    assert_eq!(notes, vec![60.0, 64.0, 67.0, 72.0]);
}

/// A playing voice keeps emitting on its own through the scheduler.
#[test]
fn test_voice_plays_through_scheduler() {
    // 960 BPM: one beat is 62.5ms
    let (engine, captured) = capture_engine(960.0);

    engine
        .play("loop", Pattern::from_notes("kick", &[36.0, 38.0]))
        .unwrap();
    thread::sleep(Duration::from_millis(400));
    engine.stop("loop");
    thread::sleep(Duration::from_millis(100));

    let captured = captured.lock().unwrap();
    // ~8 beats elapsed; allow generous scheduling slack
    assert!(captured.len() >= 4, "only {} messages", captured.len());
    // The two-note cycle alternates
    let notes: Vec<f64> = captured.iter().take(4).map(|m| decode(m).note).collect();
    assert_eq!(notes, vec![36.0, 38.0, 36.0, 38.0]);
}

/// Stopping before the queued entry pops produces no message at all and
/// the entry is not re-inserted.
#[test]
fn test_stop_discards_pending_entry() {
    let mut config = EngineConfig::default();
    config.tempo_bpm = 600.0;
    // Queue the first step at the next bar so there is time to stop
    config.quantize = QuantizePolicy::NextBar;
    let captured = Arc::new(Mutex::new(Vec::new()));
    let engine = LiveEngine::start_with_sink(
        config,
        Box::new(CaptureSink {
            captured: Arc::clone(&captured),
        }),
    )
    .unwrap();

    engine
        .play("ghost", Pattern::from_notes("kick", &[36.0]))
        .unwrap();
    assert_eq!(engine.pending_len(), 1);

    // Stop is O(1) and does not touch the queue
    assert!(engine.stop("ghost"));
    assert_eq!(engine.pending_len(), 1);

    // One bar at 600 BPM is 400ms; let the stale entry pop and discard
    thread::sleep(Duration::from_millis(700));
    assert!(captured.lock().unwrap().is_empty());
    assert_eq!(engine.pending_len(), 0, "stale entry re-inserted itself");
}

/// play() on a running voice swaps the pattern at a step boundary.
#[test]
fn test_hot_swap_takes_effect_at_step_boundary() {
    let (engine, captured) = capture_engine(960.0);

    engine
        .play("lead", Pattern::from_notes("old", &[60.0]))
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    engine
        .play("lead", Pattern::from_notes("new", &[72.0]))
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    engine.stop("lead");
    thread::sleep(Duration::from_millis(100));

    let captured = captured.lock().unwrap();
    let instruments: Vec<String> = captured.iter().map(|m| decode(m).instrument).collect();
    assert!(instruments.contains(&"old".to_string()));
    assert!(instruments.contains(&"new".to_string()));
    // Never interleaved back: once "new" appears, "old" is gone
    let first_new = instruments.iter().position(|i| i == "new").unwrap();
    assert!(instruments[first_new..].iter().all(|i| i == "new"));
}

/// Tempo changes re-time an in-flight voice without re-scheduling.
#[test]
fn test_tempo_change_speeds_up_running_voice() {
    // 60 BPM: a 1-beat step every second, so at most ~1 message early on
    let (engine, captured) = capture_engine(60.0);

    engine
        .play("slow", Pattern::from_notes("x", &[60.0]))
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    let before = captured.lock().unwrap().len();

    // 960 BPM: 62.5ms per step from the next entry onward
    engine.set_tempo(Tempo::new(960.0));
    thread::sleep(Duration::from_millis(500));
    engine.stop("slow");

    let after = captured.lock().unwrap().len();
    assert!(
        after >= before + 4,
        "voice did not speed up: {} -> {}",
        before,
        after
    );
}

/// stop_all wins over note entries due at the same instant.
#[test]
fn test_stop_all_silences_every_voice() {
    let (engine, _captured) = capture_engine(960.0);

    engine.play("a", Pattern::from_notes("x", &[1.0])).unwrap();
    engine.play("b", Pattern::from_notes("y", &[2.0])).unwrap();
    assert_eq!(engine.playing(), vec!["a".to_string(), "b".to_string()]);

    engine.stop_all();
    thread::sleep(Duration::from_millis(200));
    assert!(engine.playing().is_empty());
    // All stale entries have drained
    thread::sleep(Duration::from_millis(200));
    assert_eq!(engine.pending_len(), 0);
}

/// A voice whose pattern breaks reports the failure with its name and
/// deactivates; the engine keeps running.
#[test]
fn test_broken_pattern_reports_and_deactivates() {
    let (engine, captured) = capture_engine(960.0);

    engine
        .play(
            "broken",
            Pattern::from_notes("x", &[60.0]).with_durations(ValueSeq::Cycle(vec![])),
        )
        .unwrap();
    engine
        .play("healthy", Pattern::new("y", vec![Step::Note(50.0)]))
        .unwrap();

    thread::sleep(Duration::from_millis(300));

    assert!(!engine.is_playing("broken"));
    assert!(engine.is_playing("healthy"));
    assert!(
        engine
            .notifications()
            .iter()
            .any(|n| n.message.contains("broken")),
        "failure not attributed to the voice"
    );
    // The healthy voice kept playing
    assert!(!captured.lock().unwrap().is_empty());
    engine.stop_all();
}
