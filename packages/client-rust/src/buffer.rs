//! Bounded streaming buffer for bulk writes.
//!
//! Pulls from a lazy source until a batch is full, hands the batch
//! downstream, and flushes whatever is left when the source ends. At most one
//! batch is held in memory regardless of how large the source is.

use futures_util::stream::{Stream, StreamExt};

use crate::error::BufferError;

/// Groups `source` into batches of exactly `batch_size` items, except for a
/// final partial batch.
///
/// # Errors
///
/// [`BufferError::ZeroBatchSize`] when `batch_size` is zero.
pub fn bounded_batches<S>(
    source: S,
    batch_size: usize,
) -> Result<impl Stream<Item = Vec<S::Item>>, BufferError>
where
    S: Stream,
{
    if batch_size == 0 {
        return Err(BufferError::ZeroBatchSize);
    }
    Ok(source.chunks(batch_size))
}
