//! Queue consumer: feeds messages to a [`CatalogWriter`] concurrently.
//!
//! Message failures are logged and counted, never propagated; the loop only
//! stops when the queue closes or shutdown is requested.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::writer::{CatalogWriter, Message, Outcome};

/// Create a bounded message queue.
pub fn queue(capacity: usize) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
    mpsc::channel(capacity.max(1))
}

/// Progress callback for consumer hosts.
pub trait ConsumerProgress: Send + Sync {
    /// Called after each message, whatever its outcome.
    fn message_done(&self, report: &ConsumerReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ConsumerProgress for SilentProgress {
    fn message_done(&self, _report: &ConsumerReport) {}
}

/// Tally of processed messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    pub received: u64,
    pub dispatched: u64,
    pub skipped: u64,
    pub failed: u64,
    /// Requests the catalog accepted, known only after draining.
    pub sent: u64,
    /// Requests that failed in transport or were rejected.
    pub rejected: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn report(&self, elapsed: Duration) -> ConsumerReport {
        ConsumerReport {
            received: self.received.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed,
            ..ConsumerReport::default()
        }
    }
}

/// Drives a [`CatalogWriter`] from a message queue.
pub struct Consumer {
    writer: Arc<CatalogWriter>,
    concurrency: usize,
}

impl Consumer {
    pub fn new(writer: Arc<CatalogWriter>, concurrency: usize) -> Self {
        Self {
            writer,
            concurrency: concurrency.max(1),
        }
    }

    pub fn writer(&self) -> &Arc<CatalogWriter> {
        &self.writer
    }

    /// Consume until the queue closes or `shutdown` fires, then wait for
    /// in-progress messages and launched requests.
    pub async fn run(
        &self,
        mut rx: mpsc::Receiver<Message>,
        shutdown: CancellationToken,
        progress: Arc<dyn ConsumerProgress>,
    ) -> ConsumerReport {
        let start = Instant::now();
        let counters = Arc::new(Counters::default());
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let tracker = TaskTracker::new();

        info!(concurrency = self.concurrency, "consumer started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested, no longer taking messages");
                    break;
                }
                message = rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            counters.received.fetch_add(1, Ordering::Relaxed);

            let writer = Arc::clone(&self.writer);
            let counters = Arc::clone(&counters);
            let progress = Arc::clone(&progress);
            tracker.spawn(async move {
                let _permit = permit;
                match writer.process(message).await {
                    Ok(Outcome::Dispatched { .. }) => {
                        counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Outcome::Skipped) => {
                        counters.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) if e.is_missing_credential() => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!("no catalog account configured, message dropped");
                    }
                    Err(e) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        error!(error = %e, "message processing failed");
                    }
                }
                progress.message_done(&counters.report(start.elapsed()));
            });
        }

        tracker.close();
        tracker.wait().await;
        self.writer.drain().await;

        let mut report = counters.report(start.elapsed());
        if let Some(context) = self.writer.context() {
            let stats = context.dispatcher().stats();
            report.sent = stats.sent;
            report.rejected = stats.failed;
        }

        info!(
            received = report.received,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            sent = report.sent,
            rejected = report.rejected,
            elapsed_ms = millis(report.elapsed),
            "consumer finished"
        );
        report
    }
}

/// Whole milliseconds in `elapsed`, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
