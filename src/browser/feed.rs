//! Lazy result discovery
//!
//! Result pages render more items as the viewport moves down. `ResultFeed`
//! scrolls in small steps and yields every newly rendered item exactly once,
//! stopping when the body stops growing and no new items appear, or when an
//! end-of-results marker becomes visible.

use crate::browser::{BrowserResult, Element, Locator, Page, Scope};
use rand::Rng;
use std::collections::VecDeque;
use std::time::Duration;

/// Randomises a nominal wait by roughly ±50%
pub fn jittered(nominal: Duration) -> Duration {
    let millis = nominal.as_millis() as u64;
    if millis < 2 {
        return nominal;
    }
    let low = millis / 2;
    let high = millis + millis / 2;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// Sleeps for a jittered version of `nominal`
pub async fn pause(nominal: Duration) {
    tokio::time::sleep(jittered(nominal)).await;
}

/// Stream of result elements on one page load
pub struct ResultFeed<'p> {
    page: &'p dyn Page,
    item_css: String,
    end: Option<Locator>,
    step: u32,
    step_pause: Duration,
    seen: usize,
    last_height: Option<f64>,
    remaining_steps: u32,
    pending: VecDeque<Box<dyn Element>>,
    exhausted: bool,
}

impl<'p> ResultFeed<'p> {
    pub fn new(page: &'p dyn Page, item_css: impl Into<String>, step: u32, step_pause: Duration) -> Self {
        Self {
            page,
            item_css: item_css.into(),
            end: None,
            step: step.max(1),
            step_pause,
            seen: 0,
            last_height: None,
            remaining_steps: 0,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Stops scrolling once `end` is visible
    pub fn with_end(mut self, end: Option<Locator>) -> Self {
        self.end = end;
        self
    }

    /// Number of items yielded or queued so far
    pub fn seen(&self) -> usize {
        self.seen
    }

    /// Next newly rendered result, or `None` once the list stops growing
    pub async fn next(&mut self) -> BrowserResult<Option<Box<dyn Element>>> {
        loop {
            if let Some(element) = self.pending.pop_front() {
                return Ok(Some(element));
            }
            if self.exhausted {
                return Ok(None);
            }

            if self.remaining_steps > 0 {
                self.remaining_steps -= 1;
                self.page.scroll_by(self.step).await?;
                pause(self.step_pause).await;
                self.collect_new().await?;
                continue;
            }

            let height = self.page.body_height().await?;
            let before = self.seen;
            self.collect_new().await?;
            let found_new = self.seen > before;

            let stable = match self.last_height {
                Some(last) => height <= last && !found_new,
                None => false,
            };
            if stable || self.end_visible().await? {
                tracing::debug!(items = self.seen, height, "Result list exhausted");
                self.exhausted = true;
                continue;
            }

            let from = self.last_height.unwrap_or(0.0);
            let steps = ((height - from).max(0.0) / f64::from(self.step)).ceil() as u32;
            // at least one step, so a list that grew without a taller body is probed again
            self.remaining_steps = steps.max(1);
            self.last_height = Some(height);
        }
    }

    async fn collect_new(&mut self) -> BrowserResult<()> {
        let elements = self.page.query_all(&self.item_css).await?;
        if elements.len() > self.seen {
            let fresh = elements.len() - self.seen;
            self.pending.extend(elements.into_iter().skip(self.seen));
            self.seen += fresh;
        }
        Ok(())
    }

    async fn end_visible(&self) -> BrowserResult<bool> {
        let Some(end) = &self.end else {
            return Ok(false);
        };
        for element in Scope::Page(self.page).locate(end).await? {
            if element.is_visible().await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
