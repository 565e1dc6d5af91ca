// Pattern - what a voice plays, as data
// Lazy, restartable sequences indexed by a step counter

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Pattern evaluation errors. A voice that hits one deactivates and the
/// failure is reported with its name; the scheduler loop keeps running.
#[derive(Debug, Error, PartialEq)]
pub enum PatternError {
    #[error("empty {0} sequence")]
    EmptySequence(&'static str),

    #[error("step duration must be positive, got {0}")]
    NonPositiveDuration(f64),
}

/// One slot of a step sequence. A step may sound nothing, one note, or
/// several at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Step {
    Rest,
    Note(f64),
    Chord(Vec<f64>),
}

impl Step {
    /// Notes this step sounds (empty for a rest).
    pub fn notes(&self) -> Vec<f64> {
        match self {
            Step::Rest => Vec::new(),
            Step::Note(n) => vec![*n],
            Step::Chord(notes) => notes.clone(),
        }
    }
}

/// A lazily-evaluated numeric sequence. Indexed by the voice's step
/// counter, so re-starting a voice restarts the sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueSeq {
    /// Same value every step
    Constant(f64),
    /// Repeats after its length
    Cycle(Vec<f64>),
}

impl ValueSeq {
    pub fn value_at(&self, step: usize) -> Option<f64> {
        match self {
            ValueSeq::Constant(v) => Some(*v),
            ValueSeq::Cycle(values) => {
                if values.is_empty() {
                    None
                } else {
                    Some(values[step % values.len()])
                }
            }
        }
    }
}

/// Sequence of steps, repeating after its length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepSeq {
    Cycle(Vec<Step>),
}

impl StepSeq {
    pub fn step_at(&self, step: usize) -> Option<&Step> {
        match self {
            StepSeq::Cycle(steps) => {
                if steps.is_empty() {
                    None
                } else {
                    Some(&steps[step % steps.len()])
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StepSeq::Cycle(steps) => steps.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything one step evaluation produced: the notes to sound and the
/// parameters they carry, plus how long until the voice's next step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepEvent {
    pub instrument: String,
    pub notes: Vec<f64>,
    pub duration: f64,
    pub amplitude: f64,
    pub sustain: f64,
    pub params: BTreeMap<String, f64>,
}

/// A voice's musical behavior, as plain data.
///
/// All sequences are indexed by the same step counter and may have
/// different lengths, so a 3-note cycle against a 4-duration cycle
/// phases the way live coders expect. Serializable so patterns can be
/// written to and loaded from files by an editor front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub instrument: String,
    pub steps: StepSeq,
    #[serde(default = "default_durations")]
    pub durations: ValueSeq,
    #[serde(default = "default_amplitudes")]
    pub amplitudes: ValueSeq,
    #[serde(default = "default_sustains")]
    pub sustains: ValueSeq,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, ValueSeq>,
}

fn default_durations() -> ValueSeq {
    ValueSeq::Constant(1.0)
}

fn default_amplitudes() -> ValueSeq {
    ValueSeq::Constant(1.0)
}

fn default_sustains() -> ValueSeq {
    ValueSeq::Constant(0.5)
}

impl Pattern {
    /// One-beat steps at full amplitude; shape it with the `with_*`
    /// methods.
    pub fn new(instrument: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            instrument: instrument.into(),
            steps: StepSeq::Cycle(steps),
            durations: default_durations(),
            amplitudes: default_amplitudes(),
            sustains: default_sustains(),
            params: BTreeMap::new(),
        }
    }

    /// Convenience: a cycle of single notes.
    pub fn from_notes(instrument: impl Into<String>, notes: &[f64]) -> Self {
        Self::new(instrument, notes.iter().map(|n| Step::Note(*n)).collect())
    }

    pub fn with_durations(mut self, durations: ValueSeq) -> Self {
        self.durations = durations;
        self
    }

    pub fn with_amplitudes(mut self, amplitudes: ValueSeq) -> Self {
        self.amplitudes = amplitudes;
        self
    }

    pub fn with_sustains(mut self, sustains: ValueSeq) -> Self {
        self.sustains = sustains;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, values: ValueSeq) -> Self {
        self.params.insert(name.into(), values);
        self
    }

    /// Evaluate one step. Uniform entry point the player calls each time
    /// it is invoked; the pattern itself holds no cursor.
    pub fn eval_step(&self, step: usize) -> Result<StepEvent, PatternError> {
        let notes = self
            .steps
            .step_at(step)
            .ok_or(PatternError::EmptySequence("step"))?
            .notes();
        let duration = self
            .durations
            .value_at(step)
            .ok_or(PatternError::EmptySequence("duration"))?;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(PatternError::NonPositiveDuration(duration));
        }
        let amplitude = self
            .amplitudes
            .value_at(step)
            .ok_or(PatternError::EmptySequence("amplitude"))?;
        let sustain = self
            .sustains
            .value_at(step)
            .ok_or(PatternError::EmptySequence("sustain"))?;

        let mut params = BTreeMap::new();
        for (name, seq) in &self.params {
            let value = seq
                .value_at(step)
                .ok_or(PatternError::EmptySequence("param"))?;
            params.insert(name.clone(), value);
        }

        Ok(StepEvent {
            instrument: self.instrument.clone(),
            notes,
            duration,
            amplitude,
            sustain,
            params,
        })
    }
}
