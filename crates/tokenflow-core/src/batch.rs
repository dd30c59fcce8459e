//! Bounded-concurrency batch execution.
//!
//! Items are split into chunks of at most `batch_size`; the items of a chunk are polled
//! concurrently on the current task and the whole chunk is awaited before the next one starts.
//! Nothing is spawned: dropping the returned future drops the in-flight items with it.

use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum number of items in flight at once
    pub batch_size: usize,
    /// Pause between chunks, for rate-limited remotes
    pub delay_between_batches: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            delay_between_batches: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryOptions {
    /// Extra rounds after the first attempt
    pub max_retries: u32,
    /// Delay before retry round `r` (0-based) is `2^r * base_delay`
    pub base_delay: Duration,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryOptions {
    pub fn delay_for_round(&self, round: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(round.min(20)))
    }
}

/// Failure of a single batch item. Panics are captured with their payload text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct BatchError {
    pub message: String,
}

impl BatchError {
    fn from_error(error: &anyhow::Error) -> Self {
        Self {
            message: format!("{:#}", error),
        }
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message: format!("panicked: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    pub index: usize,
    pub error: BatchError,
}

#[derive(Debug)]
pub struct BatchResult<T> {
    /// Successful outputs in input order
    pub successes: Vec<T>,
    pub failures: Vec<BatchFailure>,
}

impl<T> BatchResult<T> {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

#[derive(Debug)]
pub struct RetryBatchResult<T> {
    /// Successful outputs in input order
    pub successes: Vec<T>,
    /// Items still failing after every retry round, with their last error
    pub failures: Vec<BatchFailure>,
    /// Number of attempts made per input index
    pub attempts: Vec<u32>,
}

impl<T> RetryBatchResult<T> {
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }
}

type Outcome<T> = (usize, Result<T, BatchError>);

pub struct BatchExecutor {
    options: BatchOptions,
}

impl BatchExecutor {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Run `task(item, index)` for every item, isolating failures per item.
    pub async fn process_batch<I, T, F, Fut>(&self, items: Vec<I>, task: F) -> BatchResult<T>
    where
        F: Fn(I, usize) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let total = items.len();
        let outcomes = self
            .run_chunks(items.into_iter().enumerate().collect(), &task)
            .await;

        let mut successes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(value) => successes.push(value),
                Err(error) => failures.push(BatchFailure { index, error }),
            }
        }

        info!(
            "Batch finished: {} succeeded, {} failed",
            successes.len(),
            failures.len()
        );
        BatchResult {
            successes,
            failures,
        }
    }

    /// Like [`process_batch`](Self::process_batch), re-submitting only failed items with
    /// exponential backoff.
    pub async fn process_batch_with_retry<I, T, F, Fut>(
        &self,
        items: Vec<I>,
        retry: &RetryOptions,
        task: F,
    ) -> RetryBatchResult<T>
    where
        I: Clone,
        F: Fn(I, usize) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let total = items.len();
        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut last_errors: Vec<Option<BatchError>> = vec![None; total];
        let mut attempts = vec![0u32; total];
        let mut pending: Vec<usize> = (0..total).collect();

        for round in 0..=retry.max_retries {
            if pending.is_empty() {
                break;
            }
            if round > 0 {
                let delay = retry.delay_for_round(round - 1);
                debug!(
                    "Retry round {} for {} items after {:?}",
                    round,
                    pending.len(),
                    delay
                );
                sleep(delay).await;
            }

            let submitted: Vec<(usize, I)> = pending
                .iter()
                .map(|&index| (index, items[index].clone()))
                .collect();
            for &index in &pending {
                attempts[index] += 1;
            }

            pending.clear();
            for (index, outcome) in self.run_chunks(submitted, &task).await {
                match outcome {
                    Ok(value) => {
                        results[index] = Some(value);
                        last_errors[index] = None;
                    }
                    Err(error) => {
                        last_errors[index] = Some(error);
                        pending.push(index);
                    }
                }
            }
        }

        let failures: Vec<BatchFailure> = pending
            .iter()
            .filter_map(|&index| {
                last_errors[index].take().map(|error| BatchFailure { index, error })
            })
            .collect();
        for failure in &failures {
            warn!(
                "Item {} failed permanently after {} attempts: {}",
                failure.index, attempts[failure.index], failure.error
            );
        }

        RetryBatchResult {
            successes: results.into_iter().flatten().collect(),
            failures,
            attempts,
        }
    }

    async fn run_chunks<I, T, F, Fut>(&self, items: Vec<(usize, I)>, task: &F) -> Vec<Outcome<T>>
    where
        F: Fn(I, usize) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let batch_size = self.options.batch_size.max(1);
        let mut outcomes = Vec::with_capacity(items.len());
        let mut remaining = items.into_iter().peekable();
        let mut chunk_number = 0usize;

        while remaining.peek().is_some() {
            if chunk_number > 0 && !self.options.delay_between_batches.is_zero() {
                sleep(self.options.delay_between_batches).await;
            }

            let chunk: Vec<(usize, I)> = remaining.by_ref().take(batch_size).collect();
            debug!("Starting chunk {} with {} items", chunk_number + 1, chunk.len());

            let in_flight = chunk.into_iter().map(|(index, item)| {
                let fut = task(item, index);
                async move {
                    let outcome = match AssertUnwindSafe(fut).catch_unwind().await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(error)) => Err(BatchError::from_error(&error)),
                        Err(payload) => Err(BatchError::from_panic(payload)),
                    };
                    (index, outcome)
                }
            });
            outcomes.extend(join_all(in_flight).await);
            chunk_number += 1;
        }

        outcomes
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(BatchOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    fn executor(batch_size: usize) -> BatchExecutor {
        BatchExecutor::new(BatchOptions {
            batch_size,
            delay_between_batches: Duration::ZERO,
        })
    }

    #[tokio::test]
    async fn test_isolation_and_ordering() {
        let items = vec![1u64, 2, 3, 4, 5];
        let result = executor(5)
            .process_batch(items, |item, index| async move {
                // Later items finish first
                sleep(Duration::from_millis(5 * (5 - index as u64))).await;
                if index == 2 {
                    anyhow::bail!("item {} is broken", item);
                }
                Ok(item * 10)
            })
            .await;

        assert_eq!(result.success_count(), 4);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.failures[0].index, 2);
        assert_eq!(result.failures[0].error.message, "item 3 is broken");
        assert_eq!(result.successes, vec![10, 20, 40, 50]);
    }

    #[tokio::test]
    async fn test_chunks_bound_concurrency() {
        let in_flight = Rc::new(RefCell::new(0usize));
        let peak = Rc::new(RefCell::new(0usize));

        let result = executor(2)
            .process_batch((0..7).collect::<Vec<u32>>(), |item, _| {
                let in_flight = in_flight.clone();
                let peak = peak.clone();
                async move {
                    *in_flight.borrow_mut() += 1;
                    let now = *in_flight.borrow();
                    if now > *peak.borrow() {
                        *peak.borrow_mut() = now;
                    }
                    sleep(Duration::from_millis(2)).await;
                    *in_flight.borrow_mut() -= 1;
                    Ok(item)
                }
            })
            .await;

        assert_eq!(result.successes, (0..7).collect::<Vec<u32>>());
        assert_eq!(*peak.borrow(), 2);
    }

    #[tokio::test]
    async fn test_panics_become_failures() {
        let result = executor(3)
            .process_batch(vec![0, 1, 2], |item, _| async move {
                if item == 1 {
                    panic!("boom");
                }
                Ok(item)
            })
            .await;

        assert_eq!(result.successes, vec![0, 2]);
        assert_eq!(result.failures[0].index, 1);
        assert!(result.failures[0].error.message.contains("boom"));
    }

    #[tokio::test]
    async fn test_retry_converges() {
        let calls: Rc<RefCell<HashMap<usize, u32>>> = Rc::new(RefCell::new(HashMap::new()));
        let retry = RetryOptions {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };

        let result = executor(5)
            .process_batch_with_retry(vec!["a", "b", "c"], &retry, |item, index| {
                let calls = calls.clone();
                async move {
                    let n = {
                        let mut calls = calls.borrow_mut();
                        let entry = calls.entry(index).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    if index == 1 && n <= 2 {
                        anyhow::bail!("transient failure {}", n);
                    }
                    Ok(item.to_uppercase())
                }
            })
            .await;

        assert_eq!(result.success_count(), 3);
        assert_eq!(result.failure_count(), 0);
        assert_eq!(result.successes, vec!["A", "B", "C"]);
        assert_eq!(result.attempts, vec![1, 3, 1]);
    }

    #[tokio::test]
    async fn test_retry_reports_permanent_failures() {
        let retry = RetryOptions {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        };
        let result = executor(2)
            .process_batch_with_retry(vec![1, 2, 3], &retry, |item, _| async move {
                if item == 3 {
                    anyhow::bail!("always down");
                }
                Ok(item)
            })
            .await;

        assert_eq!(result.successes, vec![1, 2]);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 2);
        assert_eq!(result.failures[0].error.message, "always down");
        assert_eq!(result.attempts, vec![1, 1, 3]);
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryOptions {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(retry.delay_for_round(0), Duration::from_millis(100));
        assert_eq!(retry.delay_for_round(1), Duration::from_millis(200));
        assert_eq!(retry.delay_for_round(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let result = executor(3)
            .process_batch(Vec::<u8>::new(), |item, _| async move { Ok(item) })
            .await;
        assert_eq!(result.success_count(), 0);
        assert_eq!(result.failure_count(), 0);
    }
}
