/// Single pending renewal timer owned by a session
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;

struct Armed {
    generation: u64,
    handle: AbortHandle,
}

/// At most one timer is outstanding; arming always cancels the previous one.
#[derive(Default)]
pub struct RenewalSchedule {
    slot: Mutex<Option<Armed>>,
    generation: Mutex<u64>,
}

impl RenewalSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Armed>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel any pending timer and spawn `task(generation)` to run after `delay`.
    ///
    /// The task receives its generation so it can claim the slot with [`fire`](Self::fire)
    /// before doing work that may re-arm the schedule. Must be called inside a Tokio runtime.
    pub fn reschedule<F, Fut>(&self, delay: Duration, task: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot();
        if let Some(previous) = slot.take() {
            previous.handle.abort();
            tracing::debug!(generation = previous.generation, "cancelled pending renewal");
        }

        let generation = {
            let mut counter = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
            *counter += 1;
            *counter
        };

        let job = task(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });

        *slot = Some(Armed {
            generation,
            handle: handle.abort_handle(),
        });
        tracing::debug!(generation, delay_secs = delay.as_secs(), "renewal armed");
    }

    /// Claim the slot for a timer that has just elapsed.
    ///
    /// Returns false when the timer was superseded, in which case it must not run.
    pub fn fire(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(armed) if armed.generation == generation => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self) {
        if let Some(armed) = self.slot().take() {
            armed.handle.abort();
            tracing::debug!(generation = armed.generation, "renewal cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot().as_ref().is_some_and(|armed| !armed.handle.is_finished())
    }
}

impl Drop for RenewalSchedule {
    fn drop(&mut self) {
        self.cancel();
    }
}
