// livebeat - Library exports

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod messaging;
pub mod sched;
pub mod sync;
pub mod transport;
pub mod voice;

// Re-export commonly used types for convenience
pub use clock::{BeatClock, BeatPosition, Meter, Tempo, default_clock, set_default_clock};
pub use config::{EngineConfig, SyncConfig, TransportConfig};
pub use engine::LiveEngine;
pub use error::{ActionError, ConfigError, EngineError, EngineResult, SyncError, TransportError};
pub use messaging::{Notification, NotificationCategory, NotificationLevel, Notifier};
pub use sched::{Job, JobContext, PRIORITY_CONTROL, PRIORITY_NOTE, Scheduler, SchedulerHandle};
pub use sync::{ClockSyncClient, ClockSyncServer, SyncState, SyncStatus};
pub use transport::{ControlMessage, MessageSink, TimedMessage, Transport, TransportLink, UdpSink};
pub use voice::{Pattern, QuantizePolicy, Step, ValueSeq, Voice, VoiceRegistry};
