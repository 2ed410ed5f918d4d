//! Batch worker pool and scratch buffers
//!
//! Work is split into fixed-size batches fed through a bounded queue to at
//! most `max_workers` scoped threads. All workers share one cancellation
//! token; the first error cancels the rest. Results come back in batch
//! order regardless of completion order.

use parking_lot::Mutex;
use std::sync::mpsc;
use std::thread;
use tokio_util::sync::CancellationToken;

use crate::core::constants::{SCRATCH_BUFFER_CAPACITY, SCRATCH_POOL_LIMIT};
use crate::error::QueryError;

/// Reusable index buffers
#[derive(Debug, Default)]
pub struct ScratchPool {
    buffers: Mutex<Vec<Vec<usize>>>,
}

impl ScratchPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take an empty buffer, allocating when none is idle
    pub fn acquire(&self) -> Vec<usize> {
        self.buffers
            .lock()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(SCRATCH_BUFFER_CAPACITY))
    }

    /// Return a buffer; dropped when the pool is full
    pub fn release(&self, mut buffer: Vec<usize>) {
        buffer.clear();
        let mut buffers = self.buffers.lock();
        if buffers.len() < SCRATCH_POOL_LIMIT {
            buffers.push(buffer);
        }
    }

    /// Idle buffers currently pooled
    pub fn idle(&self) -> usize {
        self.buffers.lock().len()
    }
}

/// Run `work` over `items` in batches, returning one result per batch
///
/// `work` receives the batch's offset into `items`, the batch and the shared
/// token. It must poll the token before each item.
pub(crate) fn run_batches<'a, T, R, F>(
    items: &'a [T],
    batch_size: usize,
    max_workers: usize,
    token: &CancellationToken,
    work: F,
) -> Result<Vec<R>, QueryError>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &'a [T], &CancellationToken) -> Result<R, QueryError> + Sync,
{
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let batch_size = batch_size.max(1);
    let batch_count = items.len().div_ceil(batch_size);
    let scope = token.child_token();

    if batch_count == 1 {
        return work(0, items, &scope).map(|r| vec![r]);
    }

    let workers = max_workers.clamp(1, batch_count);
    let (task_tx, task_rx) = mpsc::sync_channel::<(usize, &'a [T])>(workers);
    let task_rx = Mutex::new(task_rx);
    let (result_tx, result_rx) = mpsc::channel::<(usize, Result<R, QueryError>)>();

    tracing::trace!(items = items.len(), batch_count, workers, "Dispatching batches");

    thread::scope(|s| {
        for _ in 0..workers {
            let task_rx = &task_rx;
            let result_tx = result_tx.clone();
            let scope = &scope;
            let work = &work;
            s.spawn(move || {
                loop {
                    let next = task_rx.lock().recv();
                    let Ok((index, batch)) = next else {
                        break;
                    };
                    let result = work(index * batch_size, batch, scope);
                    if result.is_err() {
                        scope.cancel();
                    }
                    if result_tx.send((index, result)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        for (index, batch) in items.chunks(batch_size).enumerate() {
            if scope.is_cancelled() || task_tx.send((index, batch)).is_err() {
                break;
            }
        }
        drop(task_tx);

        let mut slots: Vec<Option<R>> = (0..batch_count).map(|_| None).collect();
        let mut failure: Option<QueryError> = None;
        for (index, result) in result_rx {
            match result {
                Ok(value) => slots[index] = Some(value),
                // keep the root cause over the cancellations it triggered
                Err(e) => {
                    let replace = match &failure {
                        None => true,
                        Some(QueryError::Cancelled) => !matches!(e, QueryError::Cancelled),
                        Some(_) => false,
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        slots
            .into_iter()
            .map(|slot| slot.ok_or(QueryError::Cancelled))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sum_batch(offset: usize, batch: &[u64], token: &CancellationToken) -> Result<(usize, u64), QueryError> {
        let mut sum = 0;
        for value in batch {
            if token.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            sum += value;
        }
        Ok((offset, sum))
    }

    #[test]
    fn test_results_in_batch_order() {
        let items: Vec<u64> = (0..1000).collect();
        let token = CancellationToken::new();
        let results = run_batches(&items, 7, 4, &token, sum_batch).unwrap();
        assert_eq!(results.len(), 143);
        let offsets: Vec<usize> = results.iter().map(|(o, _)| *o).collect();
        let expected: Vec<usize> = (0..143).map(|i| i * 7).collect();
        assert_eq!(offsets, expected);
        assert_eq!(results.iter().map(|(_, s)| s).sum::<u64>(), 499_500);
    }

    #[test]
    fn test_single_batch_runs_inline() {
        let items = [1u64, 2, 3];
        let results = run_batches(&items, 10, 8, &CancellationToken::new(), sum_batch).unwrap();
        assert_eq!(results, vec![(0, 6)]);
        assert!(run_batches(&[] as &[u64], 10, 8, &CancellationToken::new(), sum_batch)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_first_error_wins_over_cancellations() {
        let items: Vec<u64> = (0..100).collect();
        let err = run_batches(&items, 5, 4, &CancellationToken::new(), |offset, batch, token| {
            for (i, value) in batch.iter().enumerate() {
                if token.is_cancelled() {
                    return Err(QueryError::Cancelled);
                }
                if *value == 42 {
                    return Err(QueryError::item(offset + i, QueryError::coercion("number", "x")));
                }
            }
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, QueryError::Item { index: 42, .. }));
    }

    #[test]
    fn test_cancelled_caller_token() {
        let items: Vec<u64> = (0..100).collect();
        let token = CancellationToken::new();
        token.cancel();
        let err = run_batches(&items, 10, 2, &token, sum_batch).unwrap_err();
        assert!(matches!(err, QueryError::Cancelled));
    }

    #[test]
    fn test_worker_count_bounded() {
        let items: Vec<u64> = (0..64).collect();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        run_batches(&items, 1, 3, &CancellationToken::new(), |_, _, _| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(1));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_scratch_pool_reuse() {
        let pool = ScratchPool::new();
        let mut buf = pool.acquire();
        assert!(buf.capacity() >= SCRATCH_BUFFER_CAPACITY);
        buf.push(1);
        pool.release(buf);
        assert_eq!(pool.idle(), 1);
        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.idle(), 0);
    }
}
