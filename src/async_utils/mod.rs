//! Asynchronous utilities for use with Tokio.
//!
//! PDF editing is CPU-bound and synchronous, so the command layer reads and
//! writes files here, and hands the actual PDF work to blocking worker
//! threads.

use std::{panic, pin::Pin};

use futures::Stream;

use crate::prelude::*;

pub mod io;

/// A type alias for a boxed stream. This is used to make it easier to work
/// streams that return complex types.
pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        Err(err) => Err(anyhow!("blocking task was cancelled: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocking_results_are_returned() {
        let value = spawn_blocking_propagating_panics(|| 6 * 7).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    #[should_panic(expected = "boom")]
    async fn blocking_panics_are_propagated() {
        let _ = spawn_blocking_propagating_panics(|| -> () { panic!("boom") }).await;
    }
}
