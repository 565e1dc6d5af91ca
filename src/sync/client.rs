// Clock sync client - keeps the local clock aligned to a remote peer
// Phase jump above the threshold, tempo slew below it

use crate::clock::{BeatClock, BeatPosition, Tempo};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::messaging::{NotificationCategory, Notifier};
use crate::sched::SchedulerHandle;
use crate::sync::backoff::SyncBackoff;
use crate::sync::protocol::{SyncMessage, unix_micros_now};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Granularity of the interruptible inter-query sleep
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Observable synchronization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No successful exchange yet
    Synchronizing = 0,
    /// Receiving replies and applying corrections
    Synchronized = 1,
    /// Too many consecutive timeouts; free-running on the local clock
    Unsynchronized = 2,
}

impl From<u8> for SyncStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => SyncStatus::Synchronized,
            2 => SyncStatus::Unsynchronized,
            _ => SyncStatus::Synchronizing,
        }
    }
}

/// Atomic wrapper pour partager le status entre threads
#[derive(Clone)]
struct AtomicSyncStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicSyncStatus {
    fn new(status: SyncStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    fn get(&self) -> SyncStatus {
        SyncStatus::from(self.inner.load(Ordering::Relaxed))
    }

    fn set(&self, status: SyncStatus) {
        self.inner.store(status as u8, Ordering::Relaxed);
    }
}

/// Last successful sample, for observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncState {
    /// Remote beat position as reported (before projection)
    pub remote_beat: f64,
    /// Remote tempo in BPM
    pub remote_tempo: f64,
    /// Estimated one-way delay (half the measured round trip)
    pub measured_latency: Duration,
}

/// Periodically samples a `ClockSyncServer` and corrects the local
/// clock. Scheduling never blocks on connectivity: on timeout the
/// sample is discarded and the engine keeps running on its own clock.
pub struct ClockSyncClient {
    status: AtomicSyncStatus,
    state: Arc<Mutex<Option<SyncState>>>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ClockSyncClient {
    /// Connect to a sync server and start sampling in the background.
    ///
    /// `scheduler` is woken after each correction so pending wall-clock
    /// deadlines re-arm under the corrected clock; pass `None` when
    /// running without a scheduler loop.
    pub fn connect(
        server_addr: &str,
        clock: Arc<BeatClock>,
        scheduler: Option<SchedulerHandle>,
        config: SyncConfig,
        notifier: Notifier,
    ) -> Result<Self, SyncError> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(server_addr)?;
        socket.set_read_timeout(Some(Duration::from_millis(config.reply_timeout_ms.max(1))))?;

        let status = AtomicSyncStatus::new(SyncStatus::Synchronizing);
        let state = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let status = status.clone();
            let state = Arc::clone(&state);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                run_client(socket, clock, scheduler, config, notifier, status, state, running)
            })
        };

        Ok(Self {
            status,
            state,
            running,
            thread: Some(thread),
        })
    }

    pub fn status(&self) -> SyncStatus {
        self.status.get()
    }

    /// Last successful sample, if any exchange has completed.
    pub fn state(&self) -> Option<SyncState> {
        *self.state.lock().expect("sync state corrupted")
    }

    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ClockSyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_client(
    socket: UdpSocket,
    clock: Arc<BeatClock>,
    scheduler: Option<SchedulerHandle>,
    config: SyncConfig,
    notifier: Notifier,
    status: AtomicSyncStatus,
    state: Arc<Mutex<Option<SyncState>>>,
    running: Arc<AtomicBool>,
) {
    let mut missed: u32 = 0;
    let mut backoff = SyncBackoff::new(config.query_interval_ms, 30_000);

    while running.load(Ordering::Relaxed) {
        let sent_us = unix_micros_now();
        let sample = match send_query(&socket, sent_us) {
            Ok(()) => recv_reply(&socket, sent_us, config.reply_timeout_ms),
            // Send failure counts as a missed sample, same as a timeout
            Err(e) => Err(e),
        };

        let delay = match sample {
            Ok((beat, tempo_bpm, one_way)) => {
                missed = 0;
                backoff.reset();
                apply_correction(
                    &clock, &scheduler, &config, &notifier, beat, tempo_bpm, one_way,
                );
                *state.lock().expect("sync state corrupted") = Some(SyncState {
                    remote_beat: beat,
                    remote_tempo: tempo_bpm,
                    measured_latency: one_way,
                });
                status.set(SyncStatus::Synchronized);
                Duration::from_millis(config.query_interval_ms)
            }
            Err(e) => {
                missed = missed.saturating_add(1);
                log::debug!("sync sample discarded: {}", e);
                if missed >= config.max_missed {
                    if status.get() != SyncStatus::Unsynchronized {
                        status.set(SyncStatus::Unsynchronized);
                        notifier.warning(
                            NotificationCategory::Sync,
                            format!(
                                "no sync reply after {} attempts, free-running on local clock",
                                missed
                            ),
                        );
                    }
                    backoff.next_delay()
                } else {
                    Duration::from_millis(config.query_interval_ms)
                }
            }
        };

        // Interruptible sleep so shutdown stays prompt
        let mut remaining = delay;
        while !remaining.is_zero() && running.load(Ordering::Relaxed) {
            let slice = remaining.min(SLEEP_SLICE);
            thread::sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

fn send_query(socket: &UdpSocket, sent_us: u64) -> Result<(), SyncError> {
    let query = SyncMessage::SyncQuery {
        client_time_us: sent_us,
    };
    socket.send(&query.encode()?)?;
    Ok(())
}

/// Wait for the reply matching `sent_us`. Datagrams from earlier rounds
/// are skipped; a bound wait with no reply surfaces as
/// `SyncError::Timeout` and the caller discards the sample.
fn recv_reply(
    socket: &UdpSocket,
    sent_us: u64,
    timeout_ms: u64,
) -> Result<(f64, f64, Duration), SyncError> {
    let mut buf = [0u8; 512];
    loop {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(SyncError::Timeout(timeout_ms));
            }
            Err(e) => return Err(SyncError::Io(e)),
        };
        match SyncMessage::decode(&buf[..len]) {
            Ok(SyncMessage::SyncReply {
                beat,
                tempo_bpm,
                client_time_us,
                ..
            }) if client_time_us == sent_us => {
                let rtt = Duration::from_micros(unix_micros_now().saturating_sub(sent_us));
                return Ok((beat, tempo_bpm, rtt / 2));
            }
            // Stale reply or noise: keep waiting for ours
            Ok(_) | Err(_) => continue,
        }
    }
}

/// Project the remote position to "now" and correct the local clock:
/// a discrepancy beyond the threshold jumps phase outright; a small one
/// nudges the tempo so the error decays over the slew horizon instead
/// of producing an audible discontinuity.
fn apply_correction(
    clock: &BeatClock,
    scheduler: &Option<SchedulerHandle>,
    config: &SyncConfig,
    notifier: &Notifier,
    remote_beat: f64,
    remote_tempo_bpm: f64,
    one_way: Duration,
) {
    let remote_tempo = Tempo::clamped(remote_tempo_bpm);
    let projected = remote_beat + remote_tempo.beats_in(one_way);
    let discrepancy = projected - clock.now().beats();

    if discrepancy.abs() > config.jump_threshold_beats {
        clock.set_position(BeatPosition::new(projected));
        clock.set_tempo(remote_tempo);
        notifier.info(
            NotificationCategory::Sync,
            format!("phase jump: {:+.3} beats to {:.3}", discrepancy, projected),
        );
    } else {
        // Offset the remote tempo by what closes the gap over the
        // horizon; the next sample re-evaluates from there
        let correction_bpm = discrepancy * 60.0 / config.slew_horizon_secs;
        clock.set_tempo(Tempo::clamped(remote_tempo.bpm() + correction_bpm));
    }

    if let Some(handle) = scheduler {
        handle.wake();
    }
}
