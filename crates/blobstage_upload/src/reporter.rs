use std::sync::Arc;

use blobstage_staging::ProgressObserver;

/// A trait that can be implemented to report the progress of uploads.
pub trait Reporter: Send + Sync {
    /// Called when the processing of an item starts. The returned index is
    /// passed to the other callbacks for this item.
    fn on_item_start(&self, reference: &str) -> usize;

    /// Called while the item is staged with the number of uncompressed bytes
    /// processed so far.
    fn on_staging_progress(&self, index: usize, bytes: u64);

    /// Called once the item has been staged and the upload starts.
    fn on_staging_complete(&self, index: usize);

    /// Called when the item has been processed, whatever the outcome.
    fn on_item_complete(&self, index: usize);
}

/// Forwards the byte counts of a blob writer to a [`Reporter`].
pub(crate) struct ReporterObserver {
    reporter: Arc<dyn Reporter>,
    index: usize,
    total: u64,
}

impl ReporterObserver {
    pub fn new(reporter: Arc<dyn Reporter>, index: usize) -> Self {
        Self {
            reporter,
            index,
            total: 0,
        }
    }
}

impl ProgressObserver for ReporterObserver {
    fn on_progress(&mut self, bytes: u64) {
        self.total += bytes;
        self.reporter.on_staging_progress(self.index, self.total);
    }

    fn on_finish(&mut self) {
        self.reporter.on_staging_complete(self.index);
    }
}
