//! Bounded fan-out over a list of inputs with results kept in input order.
//!
//! Every item gets its own result slot, written exactly once by the single
//! collector loop. The first failure stops admission of further items; work
//! already in flight is allowed to finish, and items never admitted are
//! reported as [`SlotError::NotStarted`].

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Error)]
pub enum SlotError<E> {
    #[error(transparent)]
    Failed(E),
    #[error("worker aborted: {0}")]
    Aborted(String),
    #[error("not started because an earlier item failed")]
    NotStarted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub index: usize,
    pub message: String,
}

/// Summary of a batch that did not fully succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub total: usize,
    pub failures: Vec<ItemFailure>,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} items failed", self.failures.len(), self.total)
    }
}

impl std::error::Error for BatchFailure {}

#[derive(Debug)]
pub struct BatchOutcome<T, E> {
    slots: Vec<Result<T, SlotError<E>>>,
}

impl<T, E> BatchOutcome<T, E> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[Result<T, SlotError<E>>] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<Result<T, SlotError<E>>> {
        self.slots
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Result::is_ok)
    }
}

impl<T, E: fmt::Display> BatchOutcome<T, E> {
    /// All values in input order, or every failed slot with its index.
    /// Items that were never started are counted in `total` but not listed.
    pub fn into_results(self) -> Result<Vec<T>, BatchFailure> {
        let total = self.slots.len();
        let mut values = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for (index, slot) in self.slots.into_iter().enumerate() {
            match slot {
                Ok(value) => values.push(value),
                Err(SlotError::NotStarted) => {}
                Err(e) => failures.push(ItemFailure {
                    index,
                    message: e.to_string(),
                }),
            }
        }
        if failures.is_empty() {
            Ok(values)
        } else {
            Err(BatchFailure { total, failures })
        }
    }
}

type Finished<T, E> = (usize, Result<Result<T, E>, String>);

/// Run `op` over `items` with at most `concurrency` in flight.
pub async fn fan_out<I, T, E, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    op: F,
) -> BatchOutcome<T, E>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let total = items.len();
    let mut slots: Vec<Option<Result<T, SlotError<E>>>> = (0..total).map(|_| None).collect();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut workers: JoinSet<Finished<T, E>> = JoinSet::new();
    let mut admitted = 0;
    let mut failed = false;

    for (index, item) in items.into_iter().enumerate() {
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        while let Some(done) = workers.try_join_next() {
            failed |= record(&mut slots, done);
        }
        if failed {
            break;
        }

        let task = op(item);
        workers.spawn(async move {
            let _permit = permit;
            let result = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|panic| panic_message(&*panic));
            (index, result)
        });
        admitted += 1;
    }

    while let Some(done) = workers.join_next().await {
        failed |= record(&mut slots, done);
    }

    if failed {
        tracing::debug!(total, admitted, "Batch stopped after a failure");
    }

    let slots = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(result) => result,
            None if index < admitted => Err(SlotError::Aborted("task cancelled".into())),
            None => Err(SlotError::NotStarted),
        })
        .collect();
    BatchOutcome { slots }
}

/// Store a finished worker's result. Returns true if it was a failure.
fn record<T, E>(
    slots: &mut [Option<Result<T, SlotError<E>>>],
    done: Result<Finished<T, E>, tokio::task::JoinError>,
) -> bool {
    match done {
        Ok((index, Ok(Ok(value)))) => {
            slots[index] = Some(Ok(value));
            false
        }
        Ok((index, Ok(Err(e)))) => {
            slots[index] = Some(Err(SlotError::Failed(e)));
            true
        }
        Ok((index, Err(panic))) => {
            slots[index] = Some(Err(SlotError::Aborted(panic)));
            true
        }
        // Only reachable if the runtime cancels the task; its slot stays empty
        Err(e) => {
            tracing::warn!(error = %e, "Batch worker did not complete");
            true
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
