//! Ordered fallback strategies.

use std::fmt::Debug;
use std::future::Future;

use tracing::debug;

use crate::error::{Error, Result};

/// Runs `attempt` for each strategy in order and returns the first success.
///
/// When every strategy fails, the last error is returned. An empty strategy
/// list is a configuration error.
pub async fn try_in_order<S, T, F, Fut>(
    label: &str,
    strategies: impl IntoIterator<Item = S>,
    mut attempt: F,
) -> Result<T>
where
    S: Debug,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for (index, strategy) in strategies.into_iter().enumerate() {
        let description = format!("{:?}", strategy);
        match attempt(strategy).await {
            Ok(value) => {
                if index > 0 {
                    debug!(operation = label, strategy = %description, "Fallback succeeded");
                }
                return Ok(value);
            }
            Err(e) => {
                debug!(operation = label, strategy = %description, error = %e, "Attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Config(format!("no strategies for {}", label))))
}
