// Timeline - musical time value types
// Beats, tempo, and meter; conversions between beats and real time

use std::fmt;
use std::ops::{Add, Sub};
use std::time::Duration;

/// Position on the beat grid, in beats since the clock epoch.
/// Fractional values are allowed; beat 1.5 is halfway through beat 1.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct BeatPosition(f64);

impl BeatPosition {
    pub const ZERO: BeatPosition = BeatPosition(0.0);

    pub fn new(beats: f64) -> Self {
        assert!(beats.is_finite(), "Beat position must be finite");
        Self(beats)
    }

    pub fn beats(&self) -> f64 {
        self.0
    }

    /// Smallest position at or after `self` that lies on a bar line.
    pub fn next_bar(&self, meter: &Meter) -> BeatPosition {
        let bar = meter.beats_per_bar() as f64;
        BeatPosition((self.0 / bar).ceil() * bar)
    }
}

impl From<f64> for BeatPosition {
    fn from(beats: f64) -> Self {
        Self::new(beats)
    }
}

impl Add<f64> for BeatPosition {
    type Output = BeatPosition;

    fn add(self, beats: f64) -> BeatPosition {
        BeatPosition::new(self.0 + beats)
    }
}

impl Sub for BeatPosition {
    type Output = f64;

    fn sub(self, other: BeatPosition) -> f64 {
        self.0 - other.0
    }
}

impl fmt::Display for BeatPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "beat {:.3}", self.0)
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 1.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// BPM must be in range [1.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        assert!(
            bpm.is_finite() && (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm),
            "BPM must be between 1 and 999"
        );
        Self { bpm }
    }

    /// Creates a tempo, clamping out-of-range or non-finite input into the
    /// valid range. Used where the value comes from the network or from
    /// slew arithmetic rather than from the performer.
    pub fn clamped(bpm: f64) -> Self {
        if !bpm.is_finite() {
            return Self::default();
        }
        Self {
            bpm: bpm.clamp(Self::MIN_BPM, Self::MAX_BPM),
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Beats elapsed over a span of wall-clock time
    pub fn beats_in(&self, elapsed: Duration) -> f64 {
        elapsed.as_secs_f64() * self.bpm / 60.0
    }

    /// Wall-clock span covered by a number of beats
    pub fn duration_of(&self, beats: f64) -> Duration {
        Duration::from_secs_f64(beats * 60.0 / self.bpm)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Meter: how many beats make up one bar.
/// Only used for bar-aligned scheduling helpers; the beat/time mapping
/// itself never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Meter {
    beats_per_bar: u32,
}

impl Meter {
    pub fn new(beats_per_bar: u32) -> Self {
        assert!(beats_per_bar > 0, "Meter must have at least one beat per bar");
        Self { beats_per_bar }
    }

    pub fn four_four() -> Self {
        Self::new(4)
    }

    pub fn three_four() -> Self {
        Self::new(3)
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/4", self.beats_per_bar)
    }
}
