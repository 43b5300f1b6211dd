//! Fallback cascade
//!
//! Generic "try strategies in order until one succeeds" combinator shared by
//! the provider chain and the variant resolver.
//!
//! Semantics:
//! - Strategies run strictly in sequence order, one at a time
//! - A strategy returning `Err` counts as an invalid result; the error is
//!   logged at debug level and the cascade moves on
//! - `Ok(None)` means "no answer" and also moves on
//! - The first `Ok(Some(v))` for which `is_valid(&v)` holds is returned
//! - Exhaustion yields `None`, a normal outcome rather than an error
//!
//! No retries, no backoff, no concurrency.

use std::fmt::Display;
use std::future::Future;
use tracing::debug;

/// Run `strategies` in order and return the first valid result
///
/// # Example
/// ```
/// use talkkin_router::cascade::cascade;
///
/// let strategies: Vec<Box<dyn FnOnce() -> Result<Option<u32>, String>>> = vec![
///     Box::new(|| Err("backend down".to_string())),
///     Box::new(|| Ok(Some(3))),
///     Box::new(|| Ok(Some(42))),
/// ];
///
/// assert_eq!(cascade(strategies, |v| *v > 10), Some(42));
/// ```
pub fn cascade<T, E, I, S, V>(strategies: I, is_valid: V) -> Option<T>
where
    I: IntoIterator<Item = S>,
    S: FnOnce() -> Result<Option<T>, E>,
    E: Display,
    V: Fn(&T) -> bool,
{
    for (index, strategy) in strategies.into_iter().enumerate() {
        if let Some(value) = accept(index, strategy(), &is_valid) {
            return Some(value);
        }
    }
    debug!("Cascade exhausted without a valid result");
    None
}

/// [`cascade`] with the default predicate: any `Some` is valid
pub fn cascade_first<T, E, I, S>(strategies: I) -> Option<T>
where
    I: IntoIterator<Item = S>,
    S: FnOnce() -> Result<Option<T>, E>,
    E: Display,
{
    cascade(strategies, |_| true)
}

/// Asynchronous [`cascade`]: each strategy yields a future, awaited before
/// the next strategy is even constructed
pub async fn cascade_async<T, E, I, S, Fut, V>(strategies: I, is_valid: V) -> Option<T>
where
    I: IntoIterator<Item = S>,
    S: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Display,
    V: Fn(&T) -> bool,
{
    for (index, strategy) in strategies.into_iter().enumerate() {
        if let Some(value) = accept(index, strategy().await, &is_valid) {
            return Some(value);
        }
    }
    debug!("Async cascade exhausted without a valid result");
    None
}

fn accept<T, E, V>(index: usize, outcome: Result<Option<T>, E>, is_valid: &V) -> Option<T>
where
    E: Display,
    V: Fn(&T) -> bool,
{
    match outcome {
        Ok(Some(value)) if is_valid(&value) => {
            debug!(strategy = index, "Cascade strategy produced a valid result");
            Some(value)
        }
        Ok(Some(_)) => {
            debug!(strategy = index, "Cascade strategy result rejected");
            None
        }
        Ok(None) => {
            debug!(strategy = index, "Cascade strategy produced no result");
            None
        }
        Err(e) => {
            debug!(strategy = index, error = %e, "Cascade strategy failed");
            None
        }
    }
}
