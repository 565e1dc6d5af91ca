// Event queue - time-ordered pending schedule entries
// Min-ordering by (due, priority, seq); seq gives a stable FIFO tie-break

use crate::clock::BeatPosition;
use crate::sched::job::Job;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Priority for control actions that must win same-instant ties
/// against note events (e.g. "stop all" vs "note on").
pub const PRIORITY_CONTROL: i32 = -10;
/// Default priority for note-producing entries.
pub const PRIORITY_NOTE: i32 = 0;

/// One pending entry. Owned by the queue until popped; ownership then
/// transfers to the scheduler loop for the invocation.
pub struct ScheduleEntry {
    pub due: BeatPosition,
    pub priority: i32,
    pub seq: u64,
    pub job: Job,
}

impl ScheduleEntry {
    fn key(&self) -> (f64, i32, u64) {
        (self.due.beats(), self.priority, self.seq)
    }
}

impl PartialEq for ScheduleEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ScheduleEntry {}

impl PartialOrd for ScheduleEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the ordering is reversed for min-heap
// behavior. total_cmp gives a deterministic float ordering.
impl Ord for ScheduleEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        let (due_a, prio_a, seq_a) = self.key();
        let (due_b, prio_b, seq_b) = other.key();
        match due_a.total_cmp(&due_b) {
            Ordering::Equal => match prio_a.cmp(&prio_b) {
                Ordering::Equal => seq_a.cmp(&seq_b),
                o => o,
            },
            o => o,
        }
        .reverse()
    }
}

/// Time-ordered collection of pending entries.
/// Insertion is O(log n) and always succeeds; popping yields entries in
/// `(due, priority, seq)` ascending order.
pub struct EventQueue {
    heap: BinaryHeap<ScheduleEntry>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Insert a job due at `due`. Returns the assigned sequence id.
    pub fn insert(&mut self, due: BeatPosition, priority: i32, job: Job) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(ScheduleEntry {
            due,
            priority,
            seq,
            job,
        });
        seq
    }

    /// Earliest due-time currently queued.
    pub fn peek_min_due(&self) -> Option<BeatPosition> {
        self.heap.peek().map(|e| e.due)
    }

    /// Pop every entry with `due <= now`, in invocation order.
    pub fn pop_ready(&mut self, now: BeatPosition) -> Vec<ScheduleEntry> {
        let mut ready = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.due > now {
                break;
            }
            // peek said there is one
            ready.push(self.heap.pop().expect("event queue corrupted"));
        }
        ready
    }

    /// Clamp every pending due-time to `now`.
    ///
    /// Called after a clock restart: due-times computed against the old
    /// epoch are stale and become "due immediately" instead of waiting
    /// for their beat to come around again. Relative order is preserved
    /// through the (priority, seq) tie-break.
    pub fn clamp_pending_to(&mut self, now: BeatPosition) {
        let entries: Vec<ScheduleEntry> = self.heap.drain().collect();
        for mut entry in entries {
            if entry.due > now {
                entry.due = now;
            }
            self.heap.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
