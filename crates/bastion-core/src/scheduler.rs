//! A manually clocked reference `Scheduler`.
//!
//! `TickScheduler` keeps pending tasks in memory and runs them when the host
//! advances the clock with `tick()` / `advance()`. Hosts with a game loop call
//! `tick()` once per loop iteration; tests call `advance(n)`.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use bastion_contracts::error::{BastionError, BastionResult};

use crate::traits::{ScheduledTask, Scheduler, TaskHandle};

struct Pending {
    due: u64,
    task: ScheduledTask,
}

#[derive(Default)]
struct SchedulerState {
    now: u64,
    next_id: u64,
    pending: BTreeMap<u64, Pending>,
    capacity: Option<usize>,
    shut_down: bool,
}

/// In-memory, tick-driven scheduler.
///
/// Tasks never run inside `schedule_once_after`; they run from whichever
/// thread calls `tick()`, outside the internal lock, ordered by due tick and
/// then by scheduling order.
#[derive(Default)]
pub struct TickScheduler {
    state: Mutex<SchedulerState>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler that refuses new tasks once `capacity` are pending.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                capacity: Some(capacity),
                ..SchedulerState::default()
            }),
        }
    }

    /// The current tick.
    pub fn now(&self) -> u64 {
        self.lock().now
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Refuse all future scheduling and drop pending tasks.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        let dropped = state.pending.len();
        state.pending.clear();
        debug!(dropped, "tick scheduler shut down");
    }

    /// Advance the clock by one tick and run every task that became due.
    ///
    /// Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        let due = {
            let mut state = self.lock();
            state.now += 1;
            let now = state.now;
            let ready: Vec<u64> = state
                .pending
                .iter()
                .filter(|(_, p)| p.due <= now)
                .map(|(id, _)| *id)
                .collect();
            let mut due: Vec<(u64, u64, ScheduledTask)> = ready
                .into_iter()
                .filter_map(|id| state.pending.remove(&id).map(|p| (p.due, id, p.task)))
                .collect();
            due.sort_by_key(|(due, id, _)| (*due, *id));
            due
        };

        let count = due.len();
        for (_, _, task) in due {
            task();
        }
        count
    }

    /// Run `ticks` ticks. Returns the total number of tasks run.
    pub fn advance(&self, ticks: u64) -> usize {
        (0..ticks).map(|_| self.tick()).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TickScheduler {
    fn schedule_once_after(&self, ticks: u64, task: ScheduledTask) -> BastionResult<TaskHandle> {
        let mut state = self.lock();
        if state.shut_down {
            warn!("rejecting task: scheduler is shut down");
            return Err(BastionError::SchedulingFailed {
                reason: "scheduler is shut down".to_string(),
            });
        }
        if let Some(capacity) = state.capacity {
            if state.pending.len() >= capacity {
                warn!(capacity, "rejecting task: scheduler is full");
                return Err(BastionError::SchedulingFailed {
                    reason: format!("scheduler is full ({} pending tasks)", capacity),
                });
            }
        }

        let id = state.next_id;
        state.next_id += 1;
        let due = state.now.saturating_add(ticks);
        state.pending.insert(id, Pending { due, task });
        Ok(TaskHandle(id))
    }

    fn cancel(&self, handle: TaskHandle) -> bool {
        self.lock().pending.remove(&handle.0).is_some()
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("TickScheduler")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}
