// Headless demo session
// Plays two voices against a UDP sink, changes tempo live, stops clean

use livebeat::{EngineConfig, LiveEngine, Pattern, Step, Tempo, ValueSeq};
use std::thread;
use std::time::Duration;

fn main() -> livebeat::EngineResult<()> {
    env_logger::init();

    let mut config = EngineConfig::default();
    if let Some(target) = std::env::args().nth(1) {
        config.transport.target = target;
    }

    let mut engine = LiveEngine::start(config)?;
    println!(
        "livebeat demo: sending to UDP, tempo {}",
        engine.tempo()
    );

    // A four-on-the-floor kick and an offbeat bass line
    engine.play("drums", Pattern::from_notes("kick", &[36.0]))?;
    engine.play(
        "bass",
        Pattern::new(
            "saw",
            vec![
                Step::Rest,
                Step::Note(40.0),
                Step::Rest,
                Step::Note(43.0),
            ],
        )
        .with_durations(ValueSeq::Constant(0.5))
        .with_amplitudes(ValueSeq::Cycle(vec![0.9, 0.6])),
    )?;

    thread::sleep(Duration::from_secs(4));

    println!("tempo up to 160");
    engine.set_tempo(Tempo::new(160.0));

    thread::sleep(Duration::from_secs(4));

    // Swap the bass pattern live; takes effect at its next step
    engine.play(
        "bass",
        Pattern::from_notes("saw", &[40.0, 47.0, 45.0, 43.0])
            .with_durations(ValueSeq::Constant(0.25)),
    )?;

    thread::sleep(Duration::from_secs(4));

    println!("stopping");
    engine.stop_all();
    thread::sleep(Duration::from_millis(200));

    for notification in engine.notifications() {
        println!("[{:?}] {}", notification.level, notification.message);
    }

    engine.shutdown();
    Ok(())
}
