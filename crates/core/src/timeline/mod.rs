use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

/// Wall-clock source for the logical time fed into [`TimerQueue::tick`].
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    origin: Instant,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Milliseconds since the clock was started, saturating at `u64::MAX`.
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Identifies a pending task. Handles order by due time, then by the order in
/// which the tasks were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    due_ms: u64,
    seq: u64,
}

impl TaskHandle {
    pub fn due_ms(&self) -> u64 {
        self.due_ms
    }
}

/// Single-threaded delayed task queue driven by a logical millisecond clock.
///
/// Delays are measured from the queue's current logical time. While tasks are
/// being fired the logical time is the due time of the task being fired, so a
/// task that reschedules itself keeps an exact cadence even when `tick` is
/// called coarsely.
#[derive(Debug)]
pub struct TimerQueue<T> {
    now_ms: u64,
    next_seq: u64,
    pending: BTreeMap<TaskHandle, T>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<u64> {
        self.pending.keys().next().map(TaskHandle::due_ms)
    }

    /// Moves logical time forward to `now_ms` without firing anything, so
    /// delays scheduled next are measured from `now_ms`. Tasks already due
    /// stay pending until the next `pop_due`.
    pub fn advance_to(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }

    pub fn schedule(&mut self, delay_ms: u64, task: T) -> TaskHandle {
        let handle = TaskHandle {
            due_ms: self.now_ms.saturating_add(delay_ms),
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(handle, task);
        handle
    }

    /// Removes a pending task. Returns `None` if it already fired or was
    /// cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> Option<T> {
        self.pending.remove(&handle)
    }

    /// Drops every pending task and returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.pending.len();
        self.pending.clear();
        cancelled
    }

    /// Removes the earliest task due at or before `now_ms`, moving logical
    /// time to its due time. When nothing is due, logical time moves to
    /// `now_ms`. Time never moves backwards.
    ///
    /// Owners that need their own state while firing loop over this directly
    /// instead of going through [`TimerQueue::tick`].
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TaskHandle, T)> {
        let due = self
            .pending
            .first_key_value()
            .map(|(handle, _)| handle.due_ms <= now_ms)
            .unwrap_or(false);

        if due {
            let (handle, task) = self.pending.pop_first()?;
            self.now_ms = self.now_ms.max(handle.due_ms);
            Some((handle, task))
        } else {
            self.now_ms = self.now_ms.max(now_ms);
            None
        }
    }

    /// Fires every task due at or before `now_ms`, including tasks scheduled by
    /// the fired tasks themselves. Returns the number of tasks fired.
    pub fn tick(&mut self, now_ms: u64, mut fire: impl FnMut(&mut Self, T)) -> usize {
        let mut fired = 0;
        while let Some((_, task)) = self.pop_due(now_ms) {
            fire(self, task);
            fired += 1;
        }
        fired
    }
}
