// Voice player - the re-scheduling state machine behind each track
// stopped -> scheduled -> playing -> scheduled ... -> stopped

use crate::clock::BeatPosition;
use crate::error::ActionError;
use crate::messaging::NotificationCategory;
use crate::sched::job::{Job, JobContext};
use crate::sched::queue::PRIORITY_NOTE;
use crate::sched::scheduler::SchedulerHandle;
use crate::transport::message::ControlMessage;
use crate::voice::pattern::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Where a freshly started voice lands on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizePolicy {
    /// First step plays right away
    Immediate,
    /// First step waits for the next bar line
    NextBar,
}

impl Default for QuantizePolicy {
    fn default() -> Self {
        QuantizePolicy::Immediate
    }
}

struct VoiceState {
    pattern: Pattern,
    step_index: usize,
}

/// One independently scheduled, re-triggering unit of musical behavior.
///
/// The queue may hold at most one live entry per voice. Stopping only
/// clears the `active` flag: the already-queued entry finds the flag
/// down when it pops and discards itself, so stop is O(1) regardless of
/// queue size.
pub struct Voice {
    name: String,
    active: AtomicBool,
    state: Mutex<VoiceState>,
}

impl Voice {
    pub fn new(name: impl Into<String>, pattern: Pattern) -> Self {
        Self {
            name: name.into(),
            active: AtomicBool::new(true),
            state: Mutex::new(VoiceState {
                pattern,
                step_index: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the voice. Its pending queue entry becomes a no-op.
    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Swap the pattern of a running voice. Takes effect at the next
    /// step boundary; the step already in flight is never interrupted.
    pub fn set_pattern(&self, pattern: Pattern) -> Result<(), ActionError> {
        let mut state = self.lock_state()?;
        state.pattern = pattern;
        state.step_index = 0;
        Ok(())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, VoiceState>, ActionError> {
        self.state
            .lock()
            .map_err(|_| ActionError::Failed(format!("voice '{}' state poisoned", self.name)))
    }

    /// Called by the scheduler loop when this voice's entry comes due.
    ///
    /// Returns the beat to re-enqueue at, or `None` when the entry was
    /// stale (the voice was stopped after it was queued). Messages are
    /// stamped with the due beat's derived wall time, not "now", so
    /// scheduler latency never accumulates as jitter.
    pub fn invoke(
        &self,
        due: BeatPosition,
        ctx: &JobContext,
    ) -> Result<Option<BeatPosition>, ActionError> {
        if !self.is_active() {
            return Ok(None);
        }

        let event = {
            let mut state = self.lock_state()?;
            let step = state.step_index;
            match state.pattern.eval_step(step) {
                Ok(event) => {
                    state.step_index += 1;
                    event
                }
                Err(e) => {
                    // A broken pattern would fail every step; deactivate
                    // until the performer re-issues play()
                    self.stop();
                    return Err(ActionError::PatternEval {
                        voice: self.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        };

        let deadline = ctx.clock.beats_to_system_time(due);
        for note in &event.notes {
            let message = ControlMessage {
                voice: self.name.clone(),
                instrument: event.instrument.clone(),
                note: *note,
                amplitude: event.amplitude,
                sustain: event.sustain,
                params: event.params.clone(),
            };
            match message.into_timed(deadline) {
                Ok(timed) => ctx.transport.send(timed),
                Err(e) => ctx.notifier.error(
                    NotificationCategory::Voice,
                    format!("voice '{}' message encoding failed: {}", self.name, e),
                ),
            }
        }

        Ok(Some(due + event.duration))
    }
}

/// Named voices the performer can start, mutate and stop at any time.
pub struct VoiceRegistry {
    voices: Mutex<HashMap<String, Arc<Voice>>>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self {
            voices: Mutex::new(HashMap::new()),
        }
    }

    fn lock_voices(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Voice>>> {
        self.voices.lock().expect("voice registry corrupted")
    }

    /// Start a voice, or hot-swap the pattern of one already playing.
    ///
    /// A swap takes effect at the running voice's next step boundary; a
    /// new voice is enqueued immediately or at the next bar, per policy.
    pub fn play(
        &self,
        name: &str,
        pattern: Pattern,
        handle: &SchedulerHandle,
        quantize: QuantizePolicy,
    ) -> Result<(), ActionError> {
        let mut voices = self.lock_voices();

        if let Some(existing) = voices.get(name) {
            if existing.is_active() {
                return existing.set_pattern(pattern);
            }
        }

        let voice = Arc::new(Voice::new(name, pattern));
        voices.insert(name.to_string(), Arc::clone(&voice));
        drop(voices);

        let clock = &handle.context().clock;
        let due = match quantize {
            QuantizePolicy::Immediate => clock.now(),
            QuantizePolicy::NextBar => clock.next_bar(),
        };
        handle.insert_at(due, PRIORITY_NOTE, Job::voice(voice));
        Ok(())
    }

    /// Stop a voice by name. Immediate for the caller; the queue entry
    /// discards itself at its natural pop time.
    pub fn stop(&self, name: &str) -> bool {
        match self.lock_voices().remove(name) {
            Some(voice) => {
                voice.stop();
                true
            }
            None => false,
        }
    }

    /// Stop every voice. Returns how many were playing.
    pub fn stop_all(&self) -> usize {
        let mut voices = self.lock_voices();
        let count = voices.values().filter(|v| v.is_active()).count();
        for voice in voices.values() {
            voice.stop();
        }
        voices.clear();
        count
    }

    pub fn is_playing(&self, name: &str) -> bool {
        self.lock_voices()
            .get(name)
            .map(|v| v.is_active())
            .unwrap_or(false)
    }

    pub fn playing(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock_voices()
            .iter()
            .filter(|(_, v)| v.is_active())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

impl Default for VoiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
