// Clock module
// Musical time value types and the wall-clock to beat mapping

pub mod beat_clock;
pub mod timeline;

pub use beat_clock::{BeatClock, ClockSnapshot, default_clock, set_default_clock};
pub use timeline::{BeatPosition, Meter, Tempo};
