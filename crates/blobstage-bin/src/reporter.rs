use std::time::Duration;

use blobstage_upload::Reporter;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::Mutex;

/// Shows a spinner with the number of staged bytes for every item.
pub struct IndicatifReporter {
    multi_progress: MultiProgress,
    bars: Mutex<Vec<ProgressBar>>,
}

impl IndicatifReporter {
    pub fn new(multi_progress: MultiProgress) -> Self {
        Self {
            multi_progress,
            bars: Mutex::new(Vec::new()),
        }
    }

    fn bar(&self, index: usize) -> Option<ProgressBar> {
        self.bars.lock().get(index).cloned()
    }
}

fn staging_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.green} {prefix:30!} {bytes:>10} @ {bytes_per_sec:10} {wide_msg:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

impl Reporter for IndicatifReporter {
    fn on_item_start(&self, reference: &str) -> usize {
        let bar = self.multi_progress.add(
            ProgressBar::new_spinner()
                .with_style(staging_style())
                .with_prefix(reference.to_string())
                .with_message("staging"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        let mut bars = self.bars.lock();
        bars.push(bar);
        bars.len() - 1
    }

    fn on_staging_progress(&self, index: usize, bytes: u64) {
        if let Some(bar) = self.bar(index) {
            bar.set_position(bytes);
        }
    }

    fn on_staging_complete(&self, index: usize) {
        if let Some(bar) = self.bar(index) {
            bar.set_message("uploading");
        }
    }

    fn on_item_complete(&self, index: usize) {
        if let Some(bar) = self.bar(index) {
            bar.finish_and_clear();
            self.multi_progress.remove(&bar);
        }
    }
}
