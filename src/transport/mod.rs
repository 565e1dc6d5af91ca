// Transport module
// Timestamped control messages and the non-blocking outbound link

pub mod link;
pub mod message;
pub mod sink;

pub use link::{Transport, TransportLink};
pub use message::{ControlMessage, TimedMessage};
pub use sink::{MessageSink, UdpSink};
