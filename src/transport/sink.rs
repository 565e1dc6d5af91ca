// Message sinks - where timestamped control messages are delivered

use crate::error::TransportError;
use crate::transport::message::TimedMessage;
use std::net::UdpSocket;

/// Destination for outbound control messages.
/// Implementations perform the actual I/O; they run on the transport
/// worker thread, never on the scheduler loop.
pub trait MessageSink: Send {
    fn deliver(&mut self, message: &TimedMessage) -> Result<(), TransportError>;
}

/// UDP sink towards the external audio engine.
///
/// One datagram per message: an 8-byte big-endian deadline header
/// (microseconds since the Unix epoch) followed by the opaque payload
/// bytes. The engine reads the header and schedules the payload with
/// its own lookahead buffer.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    pub fn connect(target: &str) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(target)?;
        Ok(Self { socket })
    }

    fn frame(message: &TimedMessage) -> Vec<u8> {
        let mut datagram = Vec::with_capacity(8 + message.payload.len());
        datagram.extend_from_slice(&message.deadline_micros().to_be_bytes());
        datagram.extend_from_slice(&message.payload);
        datagram
    }
}

impl MessageSink for UdpSink {
    fn deliver(&mut self, message: &TimedMessage) -> Result<(), TransportError> {
        self.socket.send(&Self::frame(message))?;
        Ok(())
    }
}
