//! Submit-then-poll loop shared by every long-running backend job.
//!
//! A [`JobSource`] knows how to create one kind of job and fetch its status;
//! [`Poller`] drives the loop. Polls for one handle are strictly sequential:
//! the next fetch is scheduled only after the previous one has resolved, and
//! exactly one interval later. Loops for different handles share nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::ClientError;
use crate::types::JobHandle;

/// Result of a single status fetch
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    /// The job exists and reports PENDING.
    Pending,
    /// 204: nothing to report yet. Treated exactly like `Pending`.
    NotReadyYet,
    /// Terminal status with the job's payload.
    Ready(T),
}

#[async_trait]
pub trait JobSource: Send + Sync {
    type Request: Send + Sync + ?Sized;
    type Payload: Send + 'static;

    /// Short name used in logs.
    fn kind(&self) -> &'static str;

    /// Issue the creating request and return the job's handle.
    async fn submit(&self, request: &Self::Request) -> Result<JobHandle, ClientError>;

    /// Fetch the job's current status once.
    async fn fetch(&self, handle: &JobHandle) -> Result<PollStatus<Self::Payload>, ClientError>;
}

/// Spacing and optional bounds of a poll loop; no bound means poll until terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub deadline: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: None,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Poller {
    policy: PollPolicy,
}

impl Poller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Poll `handle` until a terminal status and return its payload.
    ///
    /// Any fetch error stops the loop and is returned as is; nothing is
    /// scheduled after it.
    pub async fn wait<S>(&self, source: &S, handle: &JobHandle) -> Result<S::Payload, ClientError>
    where
        S: JobSource + ?Sized,
    {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let status = match source.fetch(handle).await {
                Ok(status) => status,
                Err(e) => {
                    tracing::debug!(kind = source.kind(), %handle, attempts, err = %e, "poll failed");
                    return Err(e);
                }
            };

            match status {
                PollStatus::Ready(payload) => {
                    tracing::debug!(kind = source.kind(), %handle, attempts, "job ready");
                    return Ok(payload);
                }
                PollStatus::Pending | PollStatus::NotReadyYet => {
                    tracing::debug!(kind = source.kind(), %handle, attempts, "job not ready");
                }
            }

            if let Some(max) = self.policy.max_attempts
                && attempts >= max
            {
                return Err(self.abandon(source, handle, attempts));
            }
            if let Some(deadline) = self.policy.deadline
                && started.elapsed() + self.policy.interval > deadline
            {
                return Err(self.abandon(source, handle, attempts));
            }

            tokio::time::sleep(self.policy.interval).await;
        }
    }

    fn abandon<S>(&self, source: &S, handle: &JobHandle, attempts: u32) -> ClientError
    where
        S: JobSource + ?Sized,
    {
        tracing::warn!(kind = source.kind(), %handle, attempts, "giving up on job");
        ClientError::PollAbandoned {
            handle: handle.to_string(),
            attempts,
        }
    }

    /// Poll `handle` and hand the terminal payload to `on_complete`, once.
    pub async fn run<S, F>(
        &self,
        source: &S,
        handle: &JobHandle,
        on_complete: F,
    ) -> Result<(), ClientError>
    where
        S: JobSource + ?Sized,
        F: FnOnce(S::Payload),
    {
        let payload = self.wait(source, handle).await?;
        on_complete(payload);
        Ok(())
    }

    /// Submit a job, then poll it to completion.
    pub async fn submit_and_run<S, F>(
        &self,
        source: &S,
        request: &S::Request,
        on_complete: F,
    ) -> Result<JobHandle, ClientError>
    where
        S: JobSource + ?Sized,
        F: FnOnce(S::Payload),
    {
        let handle = source.submit(request).await?;
        tracing::info!(kind = source.kind(), %handle, "job submitted");
        self.run(source, &handle, on_complete).await?;
        Ok(handle)
    }

    /// Run an independent loop in the background; abort the handle to abandon it.
    pub fn spawn<S, F>(
        &self,
        source: Arc<S>,
        handle: JobHandle,
        on_complete: F,
    ) -> JoinHandle<Result<(), ClientError>>
    where
        S: JobSource + ?Sized + 'static,
        F: FnOnce(S::Payload) + Send + 'static,
    {
        let poller = self.clone();
        tokio::spawn(async move { poller.run(source.as_ref(), &handle, on_complete).await })
    }
}
