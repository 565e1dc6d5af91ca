// Jobs - what a schedule entry does when it comes due

use crate::clock::BeatClock;
use crate::error::ActionError;
use crate::messaging::Notifier;
use crate::transport::TransportLink;
use crate::voice::Voice;
use std::fmt;
use std::sync::Arc;

/// Everything a job may touch while being invoked. Built once by the
/// engine and handed to the scheduler loop; jobs only read from it.
#[derive(Clone)]
pub struct JobContext {
    pub clock: Arc<BeatClock>,
    pub transport: TransportLink,
    pub notifier: Notifier,
}

impl JobContext {
    pub fn new(clock: Arc<BeatClock>, transport: TransportLink, notifier: Notifier) -> Self {
        Self {
            clock,
            transport,
            notifier,
        }
    }
}

type OnceAction = Box<dyn FnOnce(&JobContext) -> Result<(), ActionError> + Send>;

/// A queue entry's action: either a voice that re-schedules itself each
/// step, or a labelled one-shot (e.g. "run this at next bar").
pub enum Job {
    Voice(Arc<Voice>),
    Once { label: String, action: OnceAction },
}

impl Job {
    pub fn voice(voice: Arc<Voice>) -> Self {
        Job::Voice(voice)
    }

    pub fn once(
        label: impl Into<String>,
        action: impl FnOnce(&JobContext) -> Result<(), ActionError> + Send + 'static,
    ) -> Self {
        Job::Once {
            label: label.into(),
            action: Box::new(action),
        }
    }

    /// Identity used when reporting an invocation failure.
    pub fn label(&self) -> &str {
        match self {
            Job::Voice(voice) => voice.name(),
            Job::Once { label, .. } => label,
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Voice(voice) => write!(f, "Job::Voice({})", voice.name()),
            Job::Once { label, .. } => write!(f, "Job::Once({})", label),
        }
    }
}
