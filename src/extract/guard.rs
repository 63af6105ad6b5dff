//! Visibility guard
//!
//! Every accessor that assumes a rendered element goes through these helpers,
//! so an absent or hidden element surfaces as `FieldError::Hidden` instead of
//! a lower-level fault further down.

use crate::browser::{Element, Locator, Scope};
use crate::extract::{FieldError, FieldResult};
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// First visible element matching `locator`
pub async fn visible_first(scope: Scope<'_>, locator: &Locator) -> FieldResult<Box<dyn Element>> {
    let elements = scope.locate(locator).await?;
    if elements.is_empty() {
        return Err(FieldError::Hidden(format!("nothing matches '{locator}'")));
    }
    for element in elements {
        if element.is_visible().await? {
            return Ok(element);
        }
    }
    Err(FieldError::Hidden(format!("'{locator}' is not visible")))
}

/// Number of visible elements matching `locator`
pub async fn visible_count(scope: Scope<'_>, locator: &Locator) -> FieldResult<usize> {
    let mut count = 0;
    for element in scope.locate(locator).await? {
        if element.is_visible().await? {
            count += 1;
        }
    }
    Ok(count)
}

/// Polls until `locator` is visible, failing with `Timeout` after `timeout`
pub async fn wait_visible(
    scope: Scope<'_>,
    locator: &Locator,
    timeout: Duration,
) -> FieldResult<Box<dyn Element>> {
    let deadline = Instant::now() + timeout;
    loop {
        match visible_first(scope, locator).await {
            Err(FieldError::Hidden(_)) if Instant::now() < deadline => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(FieldError::Hidden(_)) => {
                return Err(FieldError::Timeout(format!("'{locator}' to become visible")))
            }
            other => return other,
        }
    }
}
