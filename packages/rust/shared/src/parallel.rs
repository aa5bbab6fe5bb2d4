//! Bounded fan-out with cooperative cancellation.
//!
//! Every concurrent stage (site search, page extraction, ranking, cleaning)
//! goes through [`bounded_map`]: at most `max_parallelism` futures are in
//! flight, and once the shared token fires, queued items never start and
//! in-flight items are dropped at their next await point.

use std::future::Future;

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

/// Run `f` over `items` with bounded concurrency.
///
/// The output has one slot per input, in input order. A slot is `None` when
/// its item was skipped or abandoned because `cancel` fired; which items
/// finish before cancellation is inherently racy.
pub async fn bounded_map<T, R, F, Fut>(
    items: Vec<T>,
    max_parallelism: usize,
    cancel: &CancellationToken,
    mut f: F,
) -> Vec<Option<R>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = R>,
{
    let len = items.len();
    let mut results: Vec<Option<R>> = std::iter::repeat_with(|| None).take(len).collect();
    let cancel = cancel.clone();

    let mut pending = stream::iter(items.into_iter().enumerate())
        .map(move |(i, item)| {
            let fut = f(item);
            let cancel = cancel.clone();
            async move {
                if cancel.is_cancelled() {
                    return (i, None);
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => (i, None),
                    r = fut => (i, Some(r)),
                }
            }
        })
        .buffer_unordered(max_parallelism.max(1));

    while let Some((i, r)) = pending.next().await {
        results[i] = r;
    }

    results
}
