// Sync wire protocol
// JSON datagrams: a query carrying the client's clock, a reply echoing it

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One sync datagram. The query's `client_time_us` is echoed back in
/// the reply so the client can measure the round trip without the two
/// peers sharing a clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    SyncQuery {
        client_time_us: u64,
    },
    SyncReply {
        beat: f64,
        tempo_bpm: f64,
        server_time_us: u64,
        client_time_us: u64,
    },
}

impl SyncMessage {
    pub fn encode(&self) -> Result<Vec<u8>, SyncError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SyncError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Microseconds since the Unix epoch, the timestamp unit on the wire.
pub fn unix_micros_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
