use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::data::error::RateLimitError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Spaces the start of queued jobs at least `1s / per_second` apart.
///
/// Jobs are queued FIFO on an unbounded channel and drained by a single
/// consumer task: it starts one job, sleeps until the spacing has elapsed
/// from that start, then starts the next. Each caller receives its own job's
/// output through a oneshot channel, so a failing (or panicking) job never
/// affects the ones queued behind it.
#[derive(Clone)]
pub struct RateLimiter {
    queue: mpsc::UnboundedSender<Job>,
    interval: Duration,
}

impl RateLimiter {
    /// Must be called from within a tokio runtime.
    pub fn new(per_second: u32) -> Self {
        let interval = spacing(per_second);
        let (queue, mut jobs) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            let mut next_start = Instant::now();
            while let Some(job) = jobs.recv().await {
                tokio::time::sleep_until(next_start).await;
                next_start = Instant::now() + interval;
                tokio::spawn(job);
            }
            tracing::debug!("Rate limiter queue drained and closed.");
        });

        Self { queue, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queue `work` and wait for its output.
    pub async fn run<F, T>(&self, work: F) -> Result<T, RateLimitError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done, outcome) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let _ = done.send(work.await);
        });
        self.queue
            .send(job)
            .map_err(|_| RateLimitError::QueueClosed)?;
        outcome.await.map_err(|_| RateLimitError::JobDropped)
    }
}

/// One second split `per_second` ways, rounded up to the next nanosecond so
/// starts are never closer than the rate allows. Never zero.
fn spacing(per_second: u32) -> Duration {
    const NANOS_PER_SEC: u64 = 1_000_000_000;
    let per_second = u64::from(per_second.max(1));
    Duration::from_nanos(NANOS_PER_SEC.div_ceil(per_second))
}
