use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Notify;

/// Why a run stopped before every VU exhausted its iteration budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, serde::Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The `duration` deadline passed.
    Deadline,
    /// Stopped through a [`StopHandle`].
    Operator,
    /// An `abortOnFail` threshold failed mid-run.
    ThresholdAbort,
}

impl StopReason {
    fn to_u8(self) -> u8 {
        match self {
            Self::Deadline => 1,
            Self::Operator => 2,
            Self::ThresholdAbort => 3,
        }
    }

    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Deadline),
            2 => Some(Self::Operator),
            3 => Some(Self::ThresholdAbort),
            _ => None,
        }
    }
}

/// Run-wide iteration ordinal, deadline and stop flag shared by every VU.
#[derive(Debug)]
pub(crate) struct RunGate {
    global: AtomicU64,
    duration: Option<Duration>,
    deadline: OnceLock<Instant>,
    stop: AtomicU8,
    notify: Notify,
}

impl RunGate {
    pub(crate) fn new(duration: Option<Duration>) -> Self {
        Self {
            global: AtomicU64::new(0),
            duration,
            deadline: OnceLock::new(),
            stop: AtomicU8::new(0),
            notify: Notify::new(),
        }
    }

    pub(crate) fn start_at(&self, started: Instant) {
        if self.deadline.get().is_some() {
            return;
        }

        if let Some(duration) = self.duration {
            let _ = self.deadline.set(started + duration);
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline.get().copied()
    }

    /// Claims the next global iteration ordinal.
    pub(crate) fn next_global(&self) -> u64 {
        self.global.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn past_deadline(&self) -> bool {
        self.deadline
            .get()
            .is_some_and(|deadline| Instant::now() >= *deadline)
    }

    /// Requests a stop. The first reason wins; later calls are no-ops and return `false`.
    pub(crate) fn stop(&self, reason: StopReason) -> bool {
        let won = self
            .stop
            .compare_exchange(0, reason.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.notify.notify_waiters();
        }
        won
    }

    pub(crate) fn stop_reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.stop.load(Ordering::Acquire))
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Resolves once a stop has been requested.
    pub(crate) async fn stopped(&self) {
        loop {
            // Register interest before checking the flag so a concurrent `stop` is not missed.
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Lets code outside the scheduler end a run early (Ctrl-C in the CLI, a test harness).
///
/// VUs finish their in-flight iteration and end `Aborted`.
#[derive(Debug, Clone)]
pub struct StopHandle(pub(crate) Arc<RunGate>);

impl StopHandle {
    pub fn stop(&self) {
        if self.0.stop(StopReason::Operator) {
            log::info!("stop requested by operator");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
}
