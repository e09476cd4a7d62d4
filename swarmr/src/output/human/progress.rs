use std::sync::Mutex;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// One bar for a duration-bounded run, a spinner otherwise. Drawn on stderr.
pub(crate) struct HumanProgress {
    prefix: String,
    bar: Mutex<Option<ProgressBar>>,
}

impl HumanProgress {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            bar: Mutex::new(None),
        }
    }

    pub(crate) fn update(&self, total: Option<Duration>, elapsed: Duration, message: String) {
        let mut bar = self
            .bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = bar.get_or_insert_with(|| self.create(total.is_some()));
        pb.set_message(message);

        match total {
            Some(total) => {
                let total_ms = total.as_millis() as u64;
                pb.set_length(total_ms);
                pb.set_position((elapsed.as_millis() as u64).min(total_ms));
            }
            None => pb.tick(),
        }
    }

    pub(crate) fn finish(&self) {
        let mut bar = self
            .bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(pb) = bar.take() {
            pb.finish_and_clear();
        }
    }

    fn create(&self, bounded: bool) -> ProgressBar {
        let pb = if bounded {
            let pb = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr_with_hz(5));
            pb.set_style(bar_style());
            pb
        } else {
            let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr_with_hz(5));
            pb.set_style(spinner_style());
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        };
        pb.set_prefix(self.prefix.clone());
        pb
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} [ {bar:20.cyan/blue} ] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█░")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{prefix} {spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}
