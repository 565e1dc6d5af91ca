// Control messages - what the voices emit towards the audio engine

use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// An already-encoded control payload plus the absolute deadline the
/// receiving engine should honor. The payload is opaque from here on;
/// the deadline lets the engine lookahead-buffer and mask network jitter.
#[derive(Debug, Clone)]
pub struct TimedMessage {
    pub payload: Vec<u8>,
    pub deadline: SystemTime,
}

impl TimedMessage {
    pub fn new(payload: Vec<u8>, deadline: SystemTime) -> Self {
        Self { payload, deadline }
    }

    /// Deadline as microseconds since the Unix epoch, the unit used on
    /// the wire.
    pub fn deadline_micros(&self) -> u64 {
        self.deadline
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }
}

/// One note/control event, as produced by a voice step.
/// Encoded as JSON; the sink wraps it with the deadline header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Name of the voice that produced the event
    pub voice: String,
    /// Instrument the engine should play it on
    pub instrument: String,
    /// Note value (MIDI-style, fractional allowed)
    pub note: f64,
    /// Amplitude in [0, 1]
    pub amplitude: f64,
    /// Sustain in beats
    pub sustain: f64,
    /// Extra control parameters, in stable order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, f64>,
}

impl ControlMessage {
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Encode and stamp with an absolute deadline.
    pub fn into_timed(self, deadline: SystemTime) -> Result<TimedMessage, TransportError> {
        Ok(TimedMessage::new(self.encode()?, deadline))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_message_encodes_as_json() {
        let msg = ControlMessage {
            voice: "bass".to_string(),
            instrument: "saw".to_string(),
            note: 40.0,
            amplitude: 0.8,
            sustain: 0.5,
            params: BTreeMap::new(),
        };

        let bytes = msg.encode().unwrap();
        let back: ControlMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_empty_params_omitted_from_wire() {
        let msg = ControlMessage {
            voice: "v".to_string(),
            instrument: "i".to_string(),
            note: 60.0,
            amplitude: 1.0,
            sustain: 0.25,
            params: BTreeMap::new(),
        };

        let text = String::from_utf8(msg.encode().unwrap()).unwrap();
        assert!(!text.contains("params"));
    }

    #[test]
    fn test_deadline_micros() {
        let deadline = UNIX_EPOCH + std::time::Duration::from_micros(1_234_567);
        let msg = TimedMessage::new(vec![1, 2, 3], deadline);
        assert_eq!(msg.deadline_micros(), 1_234_567);
    }
}
