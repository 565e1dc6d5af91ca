// Voice module
// Patterns and the per-track re-scheduling player

pub mod pattern;
pub mod player;

pub use pattern::{Pattern, PatternError, Step, StepEvent, StepSeq, ValueSeq};
pub use player::{QuantizePolicy, Voice, VoiceRegistry};
