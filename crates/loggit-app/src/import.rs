//! Chunked, throttled bulk import.

use std::future::Future;
use std::time::Duration;

/// Throttling applied to large imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOptions {
    /// Inputs longer than this are split into chunks of this size.
    pub chunk_size: usize,
    /// Pause between consecutive chunks.
    pub pause: Duration,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            pause: Duration::from_secs(1),
        }
    }
}

/// Feeds `items` to `insert`, strictly one call after another.
///
/// Up to `chunk_size` items go in a single call. Longer inputs are split
/// into consecutive chunks in input order, with `pause` between chunks
/// (none after the last). An empty input makes no call. Stops at the first
/// failed call. Returns the result of every call, in order.
pub async fn insert_in_chunks<T, R, E, F, Fut>(
    items: &[T],
    options: &ImportOptions,
    mut insert: F,
) -> Result<Vec<R>, E>
where
    T: Clone,
    F: FnMut(Vec<T>) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let size = options.chunk_size.max(1);
    let total = items.len().div_ceil(size);
    let mut results = Vec::with_capacity(total);
    for (index, chunk) in items.chunks(size).enumerate() {
        if index > 0 && !options.pause.is_zero() {
            tokio::time::sleep(options.pause).await;
        }
        tracing::debug!(chunk = index + 1, total, len = chunk.len(), "inserting chunk");
        results.push(insert(chunk.to_vec()).await?);
    }
    Ok(results)
}
