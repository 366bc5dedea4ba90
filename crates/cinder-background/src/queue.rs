//! The two-tier task queue feeding the worker pool.
//!
//! A single deque holds `(task, priority)` pairs with the invariant that
//! every Normal task sits in front of every Background task. Normal tasks are
//! rare (interactive triggers), so the splice point is found by linear scan.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// Dispatch class of a queued task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPriority {
    /// Jumps ahead of all Background work; runs at default OS priority.
    Normal,
    /// Bulk work; runs at lowered OS priority.
    Background,
}

#[derive(Default)]
pub(crate) struct QueueState {
    pub(crate) tasks: VecDeque<(Task, TaskPriority)>,
    pub(crate) active: usize,
    pub(crate) stopping: bool,
}

pub(crate) struct TaskQueue {
    pub(crate) state: Mutex<QueueState>,
    pub(crate) cv: Condvar,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            cv: Condvar::new(),
        }
    }

    /// Enqueues a task. Tasks pushed after shutdown began are dropped.
    pub(crate) fn push(&self, task: Task, priority: TaskPriority) {
        {
            let mut state = self.state.lock().expect("task queue mutex poisoned");
            if state.stopping {
                return;
            }
            let at = match priority {
                TaskPriority::Normal => state
                    .tasks
                    .iter()
                    .position(|(_, queued)| *queued == TaskPriority::Background)
                    .unwrap_or(state.tasks.len()),
                TaskPriority::Background => state.tasks.len(),
            };
            state.tasks.insert(at, (task, priority));
        }
        self.cv.notify_all();
    }

    /// Blocks until a task is available or shutdown begins.
    ///
    /// Returns `None` on shutdown, clearing any tasks still queued. The
    /// caller must pair a `Some` return with [`TaskQueue::task_finished`].
    pub(crate) fn next(&self) -> Option<(Task, TaskPriority)> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        loop {
            if state.stopping {
                state.tasks.clear();
                self.cv.notify_all();
                return None;
            }
            if let Some(entry) = state.tasks.pop_front() {
                state.active += 1;
                return Some(entry);
            }
            state = self.cv.wait(state).expect("task queue mutex poisoned");
        }
    }

    pub(crate) fn task_finished(&self) {
        {
            let mut state = self.state.lock().expect("task queue mutex poisoned");
            debug_assert!(state.active > 0);
            state.active = state.active.saturating_sub(1);
        }
        self.cv.notify_all();
    }

    /// Waits until the queue is empty and no task is executing.
    pub(crate) fn block_until_idle(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        loop {
            if state.tasks.is_empty() && state.active == 0 {
                return true;
            }
            state = match deadline {
                None => self.cv.wait(state).expect("task queue mutex poisoned"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.cv
                        .wait_timeout(state, deadline - now)
                        .expect("task queue mutex poisoned")
                        .0
                }
            };
        }
    }

    #[cfg(test)]
    pub(crate) fn queued_priorities(&self) -> Vec<TaskPriority> {
        self.state
            .lock()
            .expect("task queue mutex poisoned")
            .tasks
            .iter()
            .map(|(_, priority)| *priority)
            .collect()
    }
}
