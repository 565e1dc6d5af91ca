// Clock sync server - publishes the local clock to network peers

use crate::clock::BeatClock;
use crate::error::SyncError;
use crate::messaging::{NotificationCategory, Notifier};
use crate::sync::protocol::{SyncMessage, unix_micros_now};
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// How long a blocking recv waits before re-checking the stop flag
const RECV_POLL: Duration = Duration::from_millis(200);

/// Answers `sync_query` datagrams with a snapshot of the local clock.
/// One socket thread; it only ever reads the clock.
pub struct ClockSyncServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ClockSyncServer {
    pub fn bind(
        addr: &str,
        clock: Arc<BeatClock>,
        notifier: Notifier,
    ) -> Result<Self, SyncError> {
        let socket = UdpSocket::bind(addr)?;
        socket.set_read_timeout(Some(RECV_POLL))?;
        let local_addr = socket.local_addr()?;
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let running = Arc::clone(&running);
            thread::spawn(move || serve(socket, clock, notifier, running))
        };

        log::info!("clock sync server listening on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    /// The bound address, useful when binding to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ClockSyncServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(socket: UdpSocket, clock: Arc<BeatClock>, notifier: Notifier, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 512];
    while running.load(Ordering::Relaxed) {
        let (len, peer) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue;
            }
            Err(e) => {
                notifier.error(
                    NotificationCategory::Sync,
                    format!("sync server receive failed: {}", e),
                );
                thread::sleep(RECV_POLL);
                continue;
            }
        };

        match SyncMessage::decode(&buf[..len]) {
            Ok(SyncMessage::SyncQuery { client_time_us }) => {
                let snapshot = clock.snapshot();
                let reply = SyncMessage::SyncReply {
                    beat: snapshot.beat.beats(),
                    tempo_bpm: snapshot.tempo.bpm(),
                    server_time_us: unix_micros_now(),
                    client_time_us,
                };
                match reply.encode() {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, peer) {
                            notifier.warning(
                                NotificationCategory::Sync,
                                format!("sync reply to {} failed: {}", peer, e),
                            );
                        }
                    }
                    Err(e) => notifier.error(
                        NotificationCategory::Sync,
                        format!("sync reply encoding failed: {}", e),
                    ),
                }
            }
            // A stray reply datagram is not ours to answer
            Ok(SyncMessage::SyncReply { .. }) => {}
            Err(e) => notifier.warning(
                NotificationCategory::Sync,
                format!("malformed sync datagram from {}: {}", peer, e),
            ),
        }
    }
}
