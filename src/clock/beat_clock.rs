// BeatClock - wall-clock to musical time conversion
// Single mark + slope representation; source of truth for "now" in beats

use crate::clock::timeline::{BeatPosition, Meter, Tempo};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime};

/// One conversion anchor: at wall time `wall` the clock was at `beat`,
/// advancing at `tempo`. Every beat/time conversion projects from here,
/// so no error accumulates across a long-running performance.
#[derive(Debug, Clone, Copy)]
struct Mark {
    wall: Instant,
    wall_sys: SystemTime,
    beat: f64,
    tempo: Tempo,
}

impl Mark {
    fn at_zero(tempo: Tempo) -> Self {
        Self {
            wall: Instant::now(),
            wall_sys: SystemTime::now(),
            beat: 0.0,
            tempo,
        }
    }

    /// Beat position at an arbitrary wall instant, projected from this mark.
    fn beat_at(&self, t: Instant) -> f64 {
        match t.checked_duration_since(self.wall) {
            Some(elapsed) => self.beat + self.tempo.beats_in(elapsed),
            // Instant before the mark (only reachable through the inverse
            // mapping in tests): project backwards.
            None => self.beat - self.tempo.beats_in(self.wall.duration_since(t)),
        }
    }
}

#[derive(Debug)]
struct ClockState {
    mark: Mark,
    meter: Meter,
}

/// A snapshot of the clock taken under one lock, so beat and tempo are
/// consistent with each other. Published by the sync server.
#[derive(Debug, Clone, Copy)]
pub struct ClockSnapshot {
    pub beat: BeatPosition,
    pub tempo: Tempo,
}

/// The tempo clock.
///
/// Converts between wall-clock time and beats. Internally a single mark
/// `(wall, beat, tempo)` under one mutex: `now()` projects forward from
/// the mark, and every mutation (tempo change, phase jump, restart)
/// re-marks at the instant of change, so wall times already assigned to
/// past beats are never retroactively altered.
#[derive(Debug)]
pub struct BeatClock {
    state: Mutex<ClockState>,
}

impl BeatClock {
    pub fn new(tempo: Tempo, meter: Meter) -> Self {
        Self {
            state: Mutex::new(ClockState {
                mark: Mark::at_zero(tempo),
                meter,
            }),
        }
    }

    // A poisoned mutex means a panic happened while re-marking; the mark
    // can no longer be trusted, which is the one fatal condition here.
    fn lock_state(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().expect("beat clock mark state corrupted")
    }

    /// Current position on the beat grid.
    pub fn now(&self) -> BeatPosition {
        let state = self.lock_state();
        BeatPosition::new(state.mark.beat_at(Instant::now()))
    }

    pub fn tempo(&self) -> Tempo {
        self.lock_state().mark.tempo
    }

    pub fn meter(&self) -> Meter {
        self.lock_state().meter
    }

    /// Consistent (beat, tempo) pair for publication to sync peers.
    pub fn snapshot(&self) -> ClockSnapshot {
        let state = self.lock_state();
        ClockSnapshot {
            beat: BeatPosition::new(state.mark.beat_at(Instant::now())),
            tempo: state.mark.tempo,
        }
    }

    /// Change tempo from this instant on.
    ///
    /// Re-marks at the current (beat, wall) point and switches the slope,
    /// under the same lock `now()` takes, so readers never observe a torn
    /// mark. Beats already in the past keep the wall times they had.
    pub fn set_tempo(&self, tempo: Tempo) {
        let mut state = self.lock_state();
        let wall = Instant::now();
        state.mark = Mark {
            wall,
            wall_sys: SystemTime::now(),
            beat: state.mark.beat_at(wall),
            tempo,
        };
    }

    pub fn set_meter(&self, meter: Meter) {
        self.lock_state().meter = meter;
    }

    /// Jump the clock to `beat` without touching the tempo.
    /// Used by clock sync to apply a phase correction.
    pub fn set_position(&self, beat: BeatPosition) {
        let mut state = self.lock_state();
        state.mark = Mark {
            wall: Instant::now(),
            wall_sys: SystemTime::now(),
            beat: beat.beats(),
            tempo: state.mark.tempo,
        };
    }

    /// Reset to beat zero, keeping tempo and meter.
    /// Queued due-times from before the restart are stale; the scheduler
    /// clamps them to "due immediately" rather than letting them wait for
    /// their beat to come around again.
    pub fn restart(&self) {
        self.set_position(BeatPosition::ZERO);
    }

    /// Wall instant at which `beat` falls under the current mark/slope.
    /// Beats at or before `now()` clamp to the present, so a stale
    /// due-time becomes "due immediately" instead of a negative sleep.
    pub fn beats_to_wall_time(&self, beat: BeatPosition) -> Instant {
        let state = self.lock_state();
        let wall_now = Instant::now();
        let now_beat = state.mark.beat_at(wall_now);
        if beat.beats() <= now_beat {
            return wall_now;
        }
        state.mark.wall + state.mark.tempo.duration_of(beat.beats() - state.mark.beat)
    }

    /// Same mapping as `beats_to_wall_time`, expressed on the system
    /// clock. This is the timestamp stamped onto outbound messages, so
    /// the receiving engine can lookahead-buffer against its own clock.
    pub fn beats_to_system_time(&self, beat: BeatPosition) -> SystemTime {
        let state = self.lock_state();
        let now_beat = state.mark.beat_at(Instant::now());
        if beat.beats() <= now_beat {
            return SystemTime::now();
        }
        state.mark.wall_sys + state.mark.tempo.duration_of(beat.beats() - state.mark.beat)
    }

    /// Inverse mapping under the current mark/slope.
    pub fn wall_time_to_beats(&self, t: Instant) -> BeatPosition {
        let state = self.lock_state();
        BeatPosition::new(state.mark.beat_at(t))
    }

    /// Time remaining until `beat`, zero if it is already due.
    pub fn time_until(&self, beat: BeatPosition) -> Duration {
        let target = self.beats_to_wall_time(beat);
        target.saturating_duration_since(Instant::now())
    }

    /// Smallest beat at or after `now()` that lies on a bar line.
    pub fn next_bar(&self) -> BeatPosition {
        let state = self.lock_state();
        let now = BeatPosition::new(state.mark.beat_at(Instant::now()));
        now.next_bar(&state.meter)
    }
}

impl Default for BeatClock {
    fn default() -> Self {
        Self::new(Tempo::default(), Meter::default())
    }
}

// Process-wide default clock. Every component takes an explicit
// Arc<BeatClock> handle; this exists for ergonomics only and can be
// swapped, which is what a session restart does.
static DEFAULT_CLOCK: Mutex<Option<Arc<BeatClock>>> = Mutex::new(None);

/// The process-wide default clock, created on first use.
pub fn default_clock() -> Arc<BeatClock> {
    let mut slot = DEFAULT_CLOCK.lock().expect("default clock slot corrupted");
    slot.get_or_insert_with(|| Arc::new(BeatClock::default()))
        .clone()
}

/// Replace the process-wide default clock.
pub fn set_default_clock(clock: Arc<BeatClock>) {
    let mut slot = DEFAULT_CLOCK.lock().expect("default clock slot corrupted");
    *slot = Some(clock);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_now_advances_with_wall_time() {
        let clock = BeatClock::new(Tempo::new(600.0), Meter::four_four());

        let before = clock.now();
        // 600 BPM = 10 beats per second, so 50ms is ~0.5 beats
        thread::sleep(Duration::from_millis(50));
        let after = clock.now();

        let elapsed = after - before;
        assert!(elapsed > 0.3, "expected ~0.5 beats, got {}", elapsed);
        assert!(elapsed < 1.5, "expected ~0.5 beats, got {}", elapsed);
    }

    #[test]
    fn test_now_monotonic_across_tempo_changes() {
        let clock = BeatClock::new(Tempo::new(120.0), Meter::four_four());

        let mut last = clock.now();
        for bpm in [240.0, 60.0, 480.0, 120.0] {
            clock.set_tempo(Tempo::new(bpm));
            let now = clock.now();
            assert!(now >= last, "now() went backwards after set_tempo");
            last = now;
        }
    }

    #[test]
    fn test_set_tempo_changes_slope_from_change_point() {
        // The new slope applies from the moment of the change, not from
        // the session start.
        let clock = BeatClock::new(Tempo::new(120.0), Meter::four_four());

        let now = clock.now();
        clock.set_tempo(Tempo::new(60.0));

        // From roughly `now`, 4 more beats at 60 BPM is ~4 seconds away.
        let target = now + 4.0;
        let wait = clock.time_until(target);
        assert!(wait > Duration::from_secs_f64(3.5), "wait was {:?}", wait);
        assert!(wait < Duration::from_secs_f64(4.5), "wait was {:?}", wait);
    }

    #[test]
    fn test_beats_wall_round_trip() {
        let clock = BeatClock::new(Tempo::new(137.0), Meter::four_four());

        let beat = clock.now() + 3.25;
        let wall = clock.beats_to_wall_time(beat);
        let back = clock.wall_time_to_beats(wall);

        assert!((back - beat).abs() < 1e-6, "round trip drifted: {}", back - beat);
    }

    #[test]
    fn test_past_beats_clamp_to_now() {
        let clock = BeatClock::new(Tempo::new(120.0), Meter::four_four());
        thread::sleep(Duration::from_millis(20));

        // A due-time behind the playhead is due immediately
        let wall = clock.beats_to_wall_time(BeatPosition::ZERO);
        assert!(wall.elapsed() < Duration::from_millis(10));
        assert_eq!(clock.time_until(BeatPosition::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_next_bar_uses_meter() {
        let clock = BeatClock::new(Tempo::new(120.0), Meter::four_four());

        let bar = clock.next_bar();
        assert!(bar.beats() % 4.0 == 0.0);
        assert!(bar >= clock.now() || (clock.now() - bar) < 1e-3);

        clock.set_meter(Meter::three_four());
        assert!(clock.next_bar().beats() % 3.0 == 0.0);
    }

    #[test]
    fn test_set_position_jumps_phase_keeps_tempo() {
        let clock = BeatClock::new(Tempo::new(240.0), Meter::four_four());

        clock.set_position(BeatPosition::new(100.0));
        let now = clock.now();
        assert!(now.beats() >= 100.0 && now.beats() < 101.0);
        assert_eq!(clock.tempo().bpm(), 240.0);
    }

    #[test]
    fn test_restart_resets_to_zero() {
        let clock = BeatClock::new(Tempo::new(240.0), Meter::four_four());
        clock.set_position(BeatPosition::new(64.0));

        clock.restart();
        assert!(clock.now().beats() < 1.0);
    }

    #[test]
    fn test_default_clock_swappable() {
        let replacement = Arc::new(BeatClock::new(Tempo::new(90.0), Meter::three_four()));
        set_default_clock(replacement.clone());

        let current = default_clock();
        assert!(Arc::ptr_eq(&current, &replacement));
        assert_eq!(current.tempo().bpm(), 90.0);
    }
}
