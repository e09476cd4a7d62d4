use std::sync::Arc;

use swarmr_data::{Record, SharedDataset};
use swarmr_metrics::Registry;

use crate::checks::{CheckRecorder, CheckResult};

/// Everything a scenario sees during one iteration.
#[derive(Debug, Clone)]
pub struct IterationContext {
    vu_id: u64,
    iteration: u64,
    global_iteration: u64,
    dataset: Option<SharedDataset>,
    record_index: Option<usize>,
    checks: CheckRecorder,
    metrics: Arc<Registry>,
}

impl IterationContext {
    /// `record_ordinal` is reduced modulo the dataset length.
    pub fn new(
        vu_id: u64,
        iteration: u64,
        global_iteration: u64,
        dataset: Option<SharedDataset>,
        record_ordinal: u64,
        checks: CheckRecorder,
        metrics: Arc<Registry>,
    ) -> Self {
        let record_index = dataset.as_ref().map(|d| d.index_for(record_ordinal));
        Self {
            vu_id,
            iteration,
            global_iteration,
            dataset,
            record_index,
            checks,
            metrics,
        }
    }

    /// 1-based.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// This VU's iteration number, 0-based.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Run-wide iteration ordinal, assigned atomically when the iteration started.
    pub fn global_iteration(&self) -> u64 {
        self.global_iteration
    }

    pub fn dataset(&self) -> Option<&SharedDataset> {
        self.dataset.as_ref()
    }

    pub fn record_index(&self) -> Option<usize> {
        self.record_index
    }

    pub fn record(&self) -> Option<&Record> {
        let idx = self.record_index?;
        self.dataset.as_ref()?.get(idx)
    }

    pub fn metrics(&self) -> &Registry {
        &self.metrics
    }

    /// Records a check and returns `passed` so callers can branch on it.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        self.checks.record(CheckResult {
            name,
            passed,
            vu_id: self.vu_id,
            iteration: self.iteration,
        });
        passed
    }

    pub fn check_with<T: ?Sized>(
        &self,
        name: &str,
        value: &T,
        pred: impl FnOnce(&T) -> bool,
    ) -> bool {
        self.check(name, pred(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarmr_data::{DatasetLoader, FieldSpec, LoadMode, Schema};

    fn ctx(global: u64) -> (IterationContext, Arc<Registry>) {
        let schema =
            Schema::new('|', vec![FieldSpec::text("email")]).unwrap_or_else(|e| panic!("{e}"));
        let ds = DatasetLoader::new(schema, LoadMode::Strict)
            .load_str("mem", "a@x\nb@x\nc@x")
            .unwrap_or_else(|e| panic!("{e}"));
        let registry = Arc::new(Registry::default());
        let checks = CheckRecorder::new(registry.rate("checks").unwrap_or_else(|e| panic!("{e}")));
        (
            IterationContext::new(2, 0, global, Some(ds), global, checks, registry.clone()),
            registry,
        )
    }

    #[test]
    fn record_is_selected_by_ordinal() {
        let (c, _) = ctx(4);
        assert_eq!(c.record_index(), Some(1));
        assert_eq!(c.record().and_then(|r| r.text("email")), Some("b@x"));
    }

    #[test]
    fn checks_return_their_verdict_and_are_recorded() {
        let (c, registry) = ctx(0);
        assert!(c.check_with("positive", &5, |v| *v > 0));
        assert!(!c.check("always false", false));
        let snap = registry.snapshot();
        assert_eq!(snap.get("checks").and_then(|m| m.pass_fraction()), Some(0.5));
    }

    #[test]
    fn no_dataset_means_no_record() {
        let registry = Arc::new(Registry::default());
        let checks = CheckRecorder::new(registry.rate("checks").unwrap_or_else(|e| panic!("{e}")));
        let c = IterationContext::new(1, 3, 9, None, 9, checks, registry);
        assert!(c.record().is_none());
        assert_eq!(c.global_iteration(), 9);
    }
}
