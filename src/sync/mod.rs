// Sync module
// Network clock synchronization between scheduler instances

pub mod backoff;
pub mod client;
pub mod protocol;
pub mod server;

pub use backoff::SyncBackoff;
pub use client::{ClockSyncClient, SyncState, SyncStatus};
pub use protocol::{SyncMessage, unix_micros_now};
pub use server::ClockSyncServer;
