use crate::cli::OutputFormat;

mod human;
mod json;

/// What the formatter prints before the first VU starts.
#[derive(Debug, Clone)]
pub(crate) struct RunHeader {
    pub plan: String,
    pub vus: u64,
    pub iterations: Option<u64>,
    pub duration: Option<std::time::Duration>,
    pub dataset_records: Option<usize>,
}

pub(crate) trait OutputFormatter: Send + Sync {
    fn print_header(&self, header: &RunHeader);
    fn progress(&self) -> Option<swarmr_core::ProgressFn>;
    fn print_summary(&self, report: &swarmr_core::ReportDocument) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}
