use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use tokio::sync::Notify;

#[derive(Debug)]
pub(crate) struct StartSignal {
    started: AtomicBool,
    notify: Notify,
}

impl StartSignal {
    pub(crate) fn new() -> Self {
        Self {
            started: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub(crate) fn start(&self) {
        self.started.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.started.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// Lifecycle of a virtual user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, serde::Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum VuState {
    Idle,
    Running,
    /// Loop ended normally: iteration budget exhausted or the deadline passed.
    Completed,
    /// Stopped by an operator or an `abortOnFail` threshold.
    Aborted,
    /// Still mid-iteration when the grace period expired; its task was cancelled.
    Abandoned,
}

impl VuState {
    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Aborted => 3,
            Self::Abandoned => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Aborted,
            4 => Self::Abandoned,
            _ => Self::Idle,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Abandoned)
    }
}

/// Per-VU bookkeeping readable by the scheduler even if the VU task is cancelled.
#[derive(Debug)]
pub(crate) struct VuSlot {
    vu_id: u64,
    state: AtomicU8,
    completed: AtomicU64,
    failed: AtomicU64,
    longest_error_streak: AtomicU64,
}

impl VuSlot {
    pub(crate) fn new(vu_id: u64) -> Self {
        Self {
            vu_id,
            state: AtomicU8::new(VuState::Idle.to_u8()),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            longest_error_streak: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> VuState {
        VuState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_running(&self) {
        let _ = self.state.compare_exchange(
            VuState::Idle.to_u8(),
            VuState::Running.to_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Moves a running VU to its final state. Returns `false` if it already left `Running`.
    pub(crate) fn finish(&self, state: VuState) -> bool {
        self.state
            .compare_exchange(
                VuState::Running.to_u8(),
                state.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Marks a VU that has not finished as abandoned.
    pub(crate) fn abandon(&self) -> bool {
        [VuState::Running, VuState::Idle].into_iter().any(|from| {
            self.state
                .compare_exchange(
                    from.to_u8(),
                    VuState::Abandoned.to_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
        })
    }

    pub(crate) fn record_iteration(&self, success: bool, streak: u64) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.longest_error_streak.fetch_max(streak, Ordering::Relaxed);
    }

    pub(crate) fn report(&self) -> VuReport {
        VuReport {
            vu_id: self.vu_id,
            state: self.state(),
            iterations_completed: self.completed.load(Ordering::Relaxed),
            iterations_failed: self.failed.load(Ordering::Relaxed),
            longest_error_streak: self.longest_error_streak.load(Ordering::Relaxed),
        }
    }
}

/// Final per-VU accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VuReport {
    pub vu_id: u64,
    pub state: VuState,
    /// Finished iterations, successful or not.
    pub iterations_completed: u64,
    pub iterations_failed: u64,
    pub longest_error_streak: u64,
}

/// Marks the VU `Aborted` if its task unwinds while still `Running`.
pub(crate) struct RunningGuard(pub(crate) Arc<VuSlot>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.0.state() == VuState::Running && std::thread::panicking() {
            self.0.finish(VuState::Aborted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_only_applies_to_running_vus() {
        let slot = VuSlot::new(1);
        assert!(!slot.finish(VuState::Completed));
        slot.set_running();
        assert!(slot.finish(VuState::Completed));
        assert!(!slot.abandon());
        assert_eq!(slot.state(), VuState::Completed);
    }

    #[test]
    fn abandon_running_vu() {
        let slot = VuSlot::new(3);
        slot.set_running();
        slot.record_iteration(false, 1);
        slot.record_iteration(false, 2);
        slot.record_iteration(true, 0);
        assert!(slot.abandon());

        let report = slot.report();
        assert_eq!(report.state, VuState::Abandoned);
        assert_eq!(report.iterations_completed, 3);
        assert_eq!(report.iterations_failed, 2);
        assert_eq!(report.longest_error_streak, 2);
    }

    #[tokio::test]
    async fn start_signal_releases_waiters() {
        let signal = Arc::new(StartSignal::new());
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };
        signal.start();
        waiter.await.unwrap_or_else(|e| panic!("{e}"));
        // Late waiters return immediately.
        signal.wait().await;
    }
}
