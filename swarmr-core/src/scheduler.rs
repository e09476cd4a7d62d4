use std::sync::Arc;
use std::time::Instant;

use swarmr_data::SharedDataset;
use swarmr_metrics::Registry;
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::checks::CheckRecorder;
use crate::config::{DatasetSelection, RunConfig};
use crate::context::IterationContext;
use crate::error::Result;
use crate::gate::{RunGate, StopHandle, StopReason};
use crate::iteration_metrics::{CHECKS, IterationMetrics};
use crate::progress::{ProgressFn, ProgressUpdate};
use crate::runner::ScenarioRunner;
use crate::scenario::Scenario;
use crate::summary::RunResult;
use crate::thresholds::{Severity, ThresholdRule, parse_rules};
use crate::thresholds_eval::{evaluate, first_abort_violation};
use crate::vu::{RunningGuard, StartSignal, VuSlot, VuState};

/// A validated run that has not started yet.
///
/// Construction performs every fatal setup step: config validation, threshold parsing and
/// built-in metric registration. Register custom metrics through [`RunContext::metrics`]
/// before calling [`run`] so name conflicts also surface before any VU starts.
#[derive(Debug)]
pub struct RunContext {
    config: RunConfig,
    metrics: Arc<Registry>,
    rules: Arc<[ThresholdRule]>,
    iteration_metrics: IterationMetrics,
    checks: CheckRecorder,
    gate: Arc<RunGate>,
    dataset: Option<SharedDataset>,
}

impl RunContext {
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        let rules: Arc<[ThresholdRule]> = parse_rules(&config.thresholds)?.into();

        let metrics = Arc::new(Registry::default());
        let iteration_metrics = IterationMetrics::register(&metrics)?;
        let checks = CheckRecorder::new(metrics.rate(CHECKS)?);
        let gate = Arc::new(RunGate::new(config.duration));

        Ok(Self {
            config,
            metrics,
            rules,
            iteration_metrics,
            checks,
            gate,
            dataset: None,
        })
    }

    #[must_use]
    pub fn with_dataset(mut self, dataset: SharedDataset) -> Self {
        self.dataset = Some(dataset);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<Registry> {
        &self.metrics
    }

    pub fn dataset(&self) -> Option<&SharedDataset> {
        self.dataset.as_ref()
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.gate.clone())
    }
}

struct VuShared<S> {
    runner: ScenarioRunner<S>,
    gate: Arc<RunGate>,
    start: StartSignal,
    dataset: Option<SharedDataset>,
    checks: CheckRecorder,
    metrics: Arc<Registry>,
    selection: DatasetSelection,
    vus: u64,
    iterations: Option<u64>,
    iteration_delay: Option<std::time::Duration>,
}

/// Drives `ctx.config().vus` virtual users through `scenario` until every VU has exhausted
/// its iteration budget, the deadline passes, or a stop is requested.
pub async fn run<S: Scenario>(
    ctx: RunContext,
    scenario: S,
    progress: Option<ProgressFn>,
) -> Result<RunResult> {
    let RunContext {
        config,
        metrics,
        rules,
        iteration_metrics,
        checks,
        gate,
        dataset,
    } = ctx;

    let shared = Arc::new(VuShared {
        runner: ScenarioRunner::new(scenario, iteration_metrics.clone()),
        gate: gate.clone(),
        start: StartSignal::new(),
        dataset,
        checks: checks.clone(),
        metrics: metrics.clone(),
        selection: config.selection,
        vus: config.vus,
        iterations: config.iterations,
        iteration_delay: config.iteration_delay,
    });

    let slots: Arc<[Arc<VuSlot>]> = (1..=config.vus)
        .map(|vu_id| Arc::new(VuSlot::new(vu_id)))
        .collect();

    let mut set = JoinSet::new();
    for (index, slot) in slots.iter().enumerate() {
        set.spawn(vu_loop(shared.clone(), slot.clone(), index as u64));
    }

    // Every VU task exists before the clock starts, so spawning stays outside the measured
    // window.
    let started = Instant::now();
    metrics.start_clock(started);
    gate.start_at(started);
    shared.start.start();
    log::info!(
        "run started: {} vus, iterations {:?}, duration {:?}",
        config.vus,
        config.iterations,
        config.duration
    );

    let ticker = spawn_ticker(&config, &metrics, &rules, &gate, &slots, progress);

    let finished = supervise(&mut set, &gate).await;
    if !finished {
        drain_with_grace(&mut set, &slots, &config).await;
    }

    if let Some(ticker) = ticker {
        ticker.abort();
        let _ = ticker.await;
    }

    let elapsed = started.elapsed();
    let snapshot = metrics.snapshot();
    let thresholds = evaluate(&snapshot, &rules);
    let vus = slots.iter().map(|s| s.report()).collect::<Vec<_>>();
    let stop_reason = gate.stop_reason();

    log::info!(
        "run finished in {elapsed:?}: {} iterations, stop reason {stop_reason:?}",
        iteration_metrics.iterations()
    );

    Ok(RunResult {
        vus,
        iterations_total: iteration_metrics.iterations(),
        iterations_failed: iteration_metrics.errors(),
        elapsed,
        metrics: snapshot,
        thresholds,
        checks: checks.summaries(),
        stop_reason,
    })
}

async fn vu_loop<S: Scenario>(shared: Arc<VuShared<S>>, slot: Arc<VuSlot>, index: u64) {
    shared.start.wait().await;
    slot.set_running();
    let _guard = RunningGuard(slot.clone());

    let vu_id = index + 1;
    let mut iteration: u64 = 0;
    let mut streak: u64 = 0;

    let final_state = loop {
        if let Some(reason) = shared.gate.stop_reason() {
            break state_after_stop(reason);
        }
        if shared.gate.past_deadline() {
            // Wake VUs sleeping in their iteration delay too.
            shared.gate.stop(StopReason::Deadline);
            break VuState::Completed;
        }
        if shared.iterations.is_some_and(|n| iteration >= n) {
            break VuState::Completed;
        }

        let global = shared.gate.next_global();
        let ordinal = match shared.selection {
            DatasetSelection::RoundRobin => global,
            DatasetSelection::Striped => iteration.wrapping_mul(shared.vus).wrapping_add(index),
        };

        let ctx = IterationContext::new(
            vu_id,
            iteration,
            global,
            shared.dataset.clone(),
            ordinal,
            shared.checks.clone(),
            shared.metrics.clone(),
        );
        let success = shared.runner.run_once(&ctx).await.is_success();
        streak = if success { 0 } else { streak.saturating_add(1) };
        slot.record_iteration(success, streak);
        iteration = iteration.saturating_add(1);

        if let Some(delay) = shared.iteration_delay {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = shared.gate.stopped() => {}
            }
        }
    };

    if slot.finish(final_state) && streak > 0 {
        log::debug!("vu {vu_id} finished with {streak} consecutive failed iterations");
    }
}

fn state_after_stop(reason: StopReason) -> VuState {
    match reason {
        StopReason::Deadline => VuState::Completed,
        StopReason::Operator | StopReason::ThresholdAbort => VuState::Aborted,
    }
}

/// Waits for every VU or for a stop, whichever comes first. Returns `true` when every VU
/// finished on its own.
async fn supervise(set: &mut JoinSet<()>, gate: &RunGate) -> bool {
    let deadline = gate.deadline();
    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                Some(res) => log_join(res),
                None => return true,
            },
            () = wait_until(deadline) => {
                if gate.stop(StopReason::Deadline) {
                    log::info!("duration elapsed; stopping VUs at their next iteration boundary");
                }
            }
            () = gate.stopped() => return false,
        }
    }
}

/// After a stop, gives in-flight iterations `grace_period` to finish, then cancels whatever
/// is left and marks those VUs abandoned.
async fn drain_with_grace(set: &mut JoinSet<()>, slots: &[Arc<VuSlot>], config: &RunConfig) {
    let grace = tokio::time::sleep(config.grace_period);
    tokio::pin!(grace);

    loop {
        tokio::select! {
            joined = set.join_next() => match joined {
                Some(res) => log_join(res),
                None => return,
            },
            () = &mut grace => break,
        }
    }

    for slot in slots {
        if slot.abandon() {
            let report = slot.report();
            log::warn!(
                "vu {} abandoned: still running {:?} after the stop ({} iterations completed)",
                report.vu_id,
                config.grace_period,
                report.iterations_completed
            );
        }
    }

    set.abort_all();
    while let Some(res) = set.join_next().await {
        log_join(res);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

fn log_join(res: std::result::Result<(), JoinError>) {
    if let Err(err) = res
        && err.is_panic()
    {
        log::error!("vu task panicked: {err}");
    }
}

fn spawn_ticker(
    config: &RunConfig,
    metrics: &Arc<Registry>,
    rules: &Arc<[ThresholdRule]>,
    gate: &Arc<RunGate>,
    slots: &Arc<[Arc<VuSlot>]>,
    progress: Option<ProgressFn>,
) -> Option<tokio::task::JoinHandle<()>> {
    let has_abort_rules = rules.iter().any(|r| r.severity == Severity::Abort);
    if progress.is_none() && !has_abort_rules {
        return None;
    }

    let interval_len = config.progress_interval;
    let duration = config.duration;
    let vus_total = config.vus;
    let metrics = metrics.clone();
    let rules = rules.clone();
    let gate = gate.clone();
    let slots = slots.clone();

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(interval_len);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        let mut tick: u64 = 0;
        let mut last_iterations: u64 = 0;
        loop {
            interval.tick().await;
            tick = tick.saturating_add(1);
            let snapshot = metrics.snapshot();

            if has_abort_rules
                && !gate.is_stopped()
                && let Some((rule, observed)) = first_abort_violation(&snapshot, &rules)
                && gate.stop(StopReason::ThresholdAbort)
            {
                log::warn!(
                    "threshold `{}` on `{}` failed mid-run (observed {observed:?}); aborting",
                    rule.source,
                    rule.metric
                );
            }

            if let Some(progress) = &progress {
                let running = slots
                    .iter()
                    .filter(|s| s.state() == VuState::Running)
                    .count() as u64;
                let update = ProgressUpdate::from_snapshot(
                    tick,
                    interval_len,
                    duration,
                    (vus_total, running),
                    last_iterations,
                    snapshot,
                );
                last_iterations = update.iterations_total;
                (progress)(update);
            }
        }
    }))
}
