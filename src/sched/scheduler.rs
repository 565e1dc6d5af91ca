// Scheduler loop - single control thread driving the event queue
// Sleeps until the next deadline, pops everything due, invokes in order

use crate::clock::BeatPosition;
use crate::messaging::NotificationCategory;
use crate::sched::job::{Job, JobContext};
use crate::sched::queue::{EventQueue, ScheduleEntry};
use spin_sleep::SpinSleeper;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

/// Residual left to the precision sleeper after the condvar wait.
/// OS timer wakeups land within a few ms; the spin sleeper covers the
/// rest without burning a full core.
const SPIN_MARGIN: Duration = Duration::from_millis(3);

struct Shared {
    queue: Mutex<EventQueue>,
    wake: Condvar,
    running: AtomicBool,
}

impl Shared {
    // Queue poisoning means an invocation panicked mid-mutation; the
    // ordering guarantees are gone, which is the fatal case.
    fn lock_queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().expect("event queue corrupted")
    }
}

/// Cloneable handle for producers: user commands starting voices, sync
/// corrections, one-shot scheduling. All operations are non-blocking
/// apart from the short queue lock.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
    ctx: JobContext,
}

impl SchedulerHandle {
    /// Insert a job due at `due`. An insertion that lowers the queue
    /// minimum interrupts the loop's sleep so the new deadline is honored.
    pub fn insert_at(&self, due: BeatPosition, priority: i32, job: Job) -> u64 {
        let seq = self.shared.lock_queue().insert(due, priority, job);
        self.shared.wake.notify_all();
        seq
    }

    /// Re-arm the loop's sleep. Called after any clock mutation (tempo,
    /// meter, position) since pending wall-clock deadlines moved.
    pub fn wake(&self) {
        self.shared.wake.notify_all();
    }

    /// Restart the clock to beat zero and clamp every pending entry to
    /// "due immediately", so nothing waits for its old beat to come
    /// around again on the new epoch.
    pub fn restart_clock(&self) {
        let mut queue = self.shared.lock_queue();
        self.ctx.clock.restart();
        queue.clamp_pending_to(BeatPosition::ZERO);
        drop(queue);
        self.shared.wake.notify_all();
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// The invocation context jobs run against.
    pub fn context(&self) -> &JobContext {
        &self.ctx
    }
}

/// Owns the dedicated scheduler thread.
pub struct Scheduler {
    handle: SchedulerHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn start(ctx: JobContext) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(EventQueue::new()),
            wake: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            let ctx = ctx.clone();
            thread::spawn(move || run_loop(shared, ctx))
        };

        Self {
            handle: SchedulerHandle { shared, ctx },
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// Stop the loop and join the thread. Pending entries are dropped.
    pub fn shutdown(&mut self) {
        self.handle.shared.running.store(false, Ordering::Relaxed);
        self.handle.shared.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_loop(shared: Arc<Shared>, ctx: JobContext) {
    log::debug!("scheduler loop started");
    let sleeper = SpinSleeper::default();

    'outer: loop {
        // Wait until the head of the queue is due. The lock is released
        // during both waits, so producers can insert at any point; every
        // insert or clock change notifies the condvar and the deadline
        // is recomputed from scratch.
        let batch: Vec<ScheduleEntry> = {
            let mut queue = shared.lock_queue();
            loop {
                if !shared.running.load(Ordering::Relaxed) {
                    break 'outer;
                }
                let Some(min_due) = queue.peek_min_due() else {
                    queue = shared
                        .wake
                        .wait(queue)
                        .expect("event queue corrupted");
                    continue;
                };
                let wait = ctx.clock.time_until(min_due);
                if wait.is_zero() {
                    break queue.pop_ready(ctx.clock.now());
                }
                if wait > SPIN_MARGIN {
                    let (guard, _) = shared
                        .wake
                        .wait_timeout(queue, wait - SPIN_MARGIN)
                        .expect("event queue corrupted");
                    queue = guard;
                    continue;
                }
                // Final stretch: precision sleep without the lock, then
                // re-check in case something earlier arrived meanwhile.
                drop(queue);
                sleeper.sleep(wait);
                queue = shared.lock_queue();
            }
        };

        // Invoke the whole batch strictly in queue order, lock released.
        // Insertions made by the batch (self-rescheduling voices, user
        // commands) land in the next wake cycle, never this one.
        let mut requeues: Vec<(BeatPosition, i32, Job)> = Vec::new();
        for entry in batch {
            let label = entry.job.label().to_string();
            match entry.job {
                Job::Voice(voice) => match voice.invoke(entry.due, &ctx) {
                    Ok(Some(next_due)) => {
                        requeues.push((next_due, entry.priority, Job::Voice(voice)));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        ctx.notifier.error(
                            NotificationCategory::Voice,
                            format!("voice '{}': {}", label, e),
                        );
                    }
                },
                Job::Once { action, .. } => {
                    if let Err(e) = action(&ctx) {
                        ctx.notifier.error(
                            NotificationCategory::Scheduler,
                            format!("action '{}' failed: {}", label, e),
                        );
                    }
                }
            }
        }

        if !requeues.is_empty() {
            let mut queue = shared.lock_queue();
            for (due, priority, job) in requeues {
                queue.insert(due, priority, job);
            }
        }
    }

    log::debug!("scheduler loop stopped");
}
