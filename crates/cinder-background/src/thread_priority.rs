//! OS thread priority for background work.
//!
//! Background-priority tasks run under `SCHED_IDLE` so bulk re-indexing never
//! competes with interactive threads. The process-wide starvation override is
//! a test hook: CI machines can be so loaded that `SCHED_IDLE` threads make
//! no progress at all.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ThreadPriority {
    Default,
    Background,
}

static PREVENT_STARVATION: AtomicBool = AtomicBool::new(false);

/// Keeps background tasks at default OS priority for the rest of the
/// process lifetime. Set once at initialization, by tests only.
pub fn prevent_thread_starvation_in_tests() {
    PREVENT_STARVATION.store(true, Ordering::Relaxed);
}

pub(crate) fn starvation_prevented() -> bool {
    PREVENT_STARVATION.load(Ordering::Relaxed)
}

#[cfg(target_os = "linux")]
pub(crate) fn set_current_thread_priority(priority: ThreadPriority) {
    use std::sync::OnceLock;

    let policy = match priority {
        ThreadPriority::Default => libc::SCHED_OTHER,
        ThreadPriority::Background => libc::SCHED_IDLE,
    };
    let param = libc::sched_param { sched_priority: 0 };
    // pid 0 addresses the calling thread.
    let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if rc != 0 {
        static PRIORITY_ERROR_LOGGED: OnceLock<()> = OnceLock::new();
        if PRIORITY_ERROR_LOGGED.set(()).is_ok() {
            tracing::debug!(
                target = "cinder.background",
                error = %std::io::Error::last_os_error(),
                "failed to adjust worker thread priority"
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn set_current_thread_priority(_priority: ThreadPriority) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starvation_override_is_sticky() {
        prevent_thread_starvation_in_tests();
        assert!(starvation_prevented());
    }
}
