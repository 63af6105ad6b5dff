//! Re-crawl queue
//!
//! Decides which listing URLs of one publisher are due for a detail visit
//! and walks them in fixed-size windows. The window only slides when the
//! previous batch made no net progress, so listings that drop out of the
//! selection after a visit never leave a gap behind.

use crate::config::CrawlSettings;
use crate::storage::{QueueSelection, StorageResult, Store, Window};
use chrono::{DateTime, Utc};

/// A listing URL due for a visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlCandidate {
    pub publisher: String,
    pub url: String,
}

/// One window of the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBatch {
    /// Due listings in the whole queue, not just this batch
    pub total: u64,
    pub candidates: Vec<CrawlCandidate>,
}

/// Staleness-aware selector of listings due for a detail visit
#[derive(Debug, Clone)]
pub struct CrawlQueue {
    publisher: String,
    only_inspect: bool,
    look_back: Option<chrono::Duration>,
    revisit_unfinished: bool,
}

impl CrawlQueue {
    pub fn new(publisher: impl Into<String>, settings: &CrawlSettings) -> Self {
        Self {
            publisher: publisher.into(),
            only_inspect: settings.only_inspect,
            look_back: settings.look_back(),
            revisit_unfinished: settings.revisit_unfinished,
        }
    }

    pub fn only_inspect(&self) -> bool {
        self.only_inspect
    }

    /// The selection predicate as of `now`
    pub fn selection(&self, now: DateTime<Utc>) -> QueueSelection {
        QueueSelection {
            only_inspect: self.only_inspect,
            stale_before: self
                .look_back
                .and_then(|window| now.checked_sub_signed(window)),
            revisit_unfinished: self.revisit_unfinished,
        }
    }

    /// Due listings inside `window`, newest first
    pub fn next(&self, store: &dyn Store, window: Window) -> StorageResult<QueueBatch> {
        let selection = self.selection(Utc::now());
        let (total, urls) = store.query(&self.publisher, &selection, window)?;
        Ok(QueueBatch {
            total,
            candidates: urls
                .into_iter()
                .map(|url| CrawlCandidate {
                    publisher: self.publisher.clone(),
                    url,
                })
                .collect(),
        })
    }
}

/// Position of the detail phase inside the queue
#[derive(Debug, Clone)]
pub struct QueueCursor {
    batch_size: u64,
    offset: u64,
    previous_total: Option<u64>,
    only_inspect: bool,
}

impl QueueCursor {
    pub fn new(batch_size: u32, only_inspect: bool) -> Self {
        Self {
            batch_size: u64::from(batch_size.max(1)),
            offset: 0,
            previous_total: None,
            only_inspect,
        }
    }

    pub fn window(&self) -> Window {
        Window::new(self.offset, self.batch_size)
    }

    /// Moves the window after a batch has been processed
    ///
    /// # Arguments
    ///
    /// * `total` - Queue size reported with the batch
    /// * `all_seen` - Every candidate of the batch was already attempted
    ///   during this phase
    pub fn advance(&mut self, total: u64, all_seen: bool) {
        let stalled = !self.only_inspect && self.previous_total == Some(total);
        if stalled || all_seen {
            self.offset += self.batch_size;
        }
        self.previous_total = Some(total);
    }
}
