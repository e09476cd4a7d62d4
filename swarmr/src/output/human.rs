use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_ms, format_rate};
use progress::HumanProgress;
use summary::render;

use super::{OutputFormatter, RunHeader};

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new("swarmr")),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, header: &RunHeader) {
        println!("plan: {}", header.plan);
        let iterations = header
            .iterations
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        let duration = header
            .duration
            .map_or_else(|| "-".to_string(), format_duration);
        println!("vus={} iterations={iterations} duration={duration}", header.vus);
        if let Some(records) = header.dataset_records {
            println!("dataset: {records} records");
        }
        println!();
    }

    fn progress(&self) -> Option<swarmr_core::ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u| {
            let checks = if u.checks_total == 0 {
                "-".to_string()
            } else {
                format!("{}/{}", u.checks_passes, u.checks_total)
            };
            let message = format!(
                "vus={}/{} elapsed={} iters={} iters/s={} errors={} checks={checks} p95={}",
                u.vus_running,
                u.vus_total,
                format_duration(u.elapsed),
                u.iterations_total,
                format_rate(u.iterations_per_sec_now),
                u.iteration_errors,
                format_ms(u.iteration_duration_p95_ms),
            );
            progress.update(u.duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, report: &swarmr_core::ReportDocument) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(report));

        let failed: Vec<_> = report.thresholds.iter().filter(|t| !t.passed).collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed:");
            for t in failed {
                match t.observed {
                    Some(obs) => eprintln!("  {}: {} (observed {obs})", t.metric, t.expression),
                    None => eprintln!(
                        "  {}: {} (aggregation does not apply)",
                        t.metric, t.expression
                    ),
                }
            }
        }

        Ok(())
    }
}
