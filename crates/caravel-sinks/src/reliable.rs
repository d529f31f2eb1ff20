//! The reliable-sink engine: retrying sends and the single-flusher drain.
//!
//! A reliable sink sends prepared upload batches through an
//! [`UploadTransport`]. Failures the transport classifies as recoverable
//! are retried in-flight with a jittered, attempt-linear backoff; once the
//! attempt budget is exhausted the batch is demoted to the bounded
//! [`RetryQueue`]. A periodic [`flush`](ReliableSink::flush) drains the
//! queue oldest-first behind a non-blocking single-holder gate, so a slow
//! drain after a long outage can never stack concurrent flushers or
//! duplicate an upload.
//!
//! During a flush each batch gets a single attempt. A recoverable failure
//! puts the batch back at the head and ends the drain; a non-recoverable
//! failure drops the batch so it cannot poison the head of the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::queue::{RetryQueue, RETRY_QUEUE_LIMIT};

/// Transport failure, classified by the transport itself.
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// Worth retrying: throttling, transient network trouble.
    #[error("recoverable upload failure: {0}")]
    Recoverable(String),

    /// Not worth retrying: rejected payload, authorization failure.
    #[error("upload rejected: {0}")]
    NonRecoverable(String),
}

impl UploadError {
    /// Whether the retry policy applies to this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}

/// The remote-service client contract.
///
/// Requests are opaque immutable batches; the engine never inspects them.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// The upload batch type.
    type Request: Send + Sync + 'static;

    /// Performs one upload attempt.
    async fn send_request(&self, request: &Self::Request) -> Result<(), UploadError>;
}

// =============================================================================
// Counters
// =============================================================================

/// Accumulator counters written by the send/flush paths.
///
/// Writes are atomic; reads are monotone snapshots taken by metric
/// aggregation.
#[derive(Default)]
pub struct SinkCounters {
    service_success: AtomicU64,
    recoverable_service_errors: AtomicU64,
    nonrecoverable_service_errors: AtomicU64,
    latency_ms: AtomicU64,
}

impl SinkCounters {
    fn record_latency(&self, elapsed: Duration) {
        self.latency_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Takes a snapshot of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            service_success: self.service_success.load(Ordering::Relaxed),
            recoverable_service_errors: self.recoverable_service_errors.load(Ordering::Relaxed),
            nonrecoverable_service_errors: self
                .nonrecoverable_service_errors
                .load(Ordering::Relaxed),
            latency_ms: self.latency_ms.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time view of [`SinkCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub service_success: u64,
    pub recoverable_service_errors: u64,
    pub nonrecoverable_service_errors: u64,
    pub latency_ms: u64,
}

// =============================================================================
// Engine
// =============================================================================

/// Tuning knobs for the engine.
#[derive(Debug, Clone)]
pub struct ReliableSinkOptions {
    /// Total attempts per batch, including the first.
    pub attempt_limit: u32,
    /// Backoff scale: the delay before retry `a` is drawn from
    /// `Uniform[0, backoff_interval · a) × 100` ms.
    pub backoff_interval: u32,
    /// Pause between successful sends while draining the queue.
    pub flush_delay: Duration,
    /// Retry queue capacity.
    pub queue_capacity: usize,
}

impl Default for ReliableSinkOptions {
    fn default() -> Self {
        Self {
            attempt_limit: 3,
            backoff_interval: 60,
            flush_delay: Duration::from_millis(100),
            queue_capacity: RETRY_QUEUE_LIMIT,
        }
    }
}

/// The retry/flush engine behind every reliable sink.
pub struct ReliableSink<T: UploadTransport> {
    transport: T,
    queue: RetryQueue<T::Request>,
    flush_gate: Semaphore,
    counters: SinkCounters,
    options: ReliableSinkOptions,
}

impl<T: UploadTransport> ReliableSink<T> {
    /// Creates an engine around a transport.
    pub fn new(transport: T, options: ReliableSinkOptions) -> Self {
        Self {
            transport,
            queue: RetryQueue::with_capacity(options.queue_capacity),
            flush_gate: Semaphore::new(1),
            counters: SinkCounters::default(),
            options,
        }
    }

    /// Sends one batch under the retry policy.
    ///
    /// Recoverable failures are retried up to the attempt limit with
    /// jittered backoff; when the budget runs out the batch is demoted to
    /// the retry queue. Non-recoverable failures drop the batch.
    pub async fn send(&self, request: T::Request) {
        for attempt in 1..=self.options.attempt_limit.max(1) {
            let started = Instant::now();
            let result = self.transport.send_request(&request).await;
            self.counters.record_latency(started.elapsed());

            match result {
                Ok(()) => {
                    self.counters.service_success.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) if e.is_recoverable() => {
                    self.counters
                        .recoverable_service_errors
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(attempt, error = %e, "Recoverable upload failure");
                    if attempt < self.options.attempt_limit {
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
                Err(e) => {
                    self.counters
                        .nonrecoverable_service_errors
                        .fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Dropping batch after non-recoverable upload failure");
                    return;
                }
            }
        }

        if self.queue.enqueue(request).is_some() {
            self.counters
                .nonrecoverable_service_errors
                .fetch_add(1, Ordering::Relaxed);
            warn!(
                capacity = self.queue.capacity(),
                "Retry queue full, dropped oldest batch"
            );
        }
    }

    /// Drains the retry queue, oldest first.
    ///
    /// Non-blocking single-holder: when another flusher is already
    /// running, this returns immediately. Each batch gets exactly one
    /// attempt; the first recoverable failure ends the drain with the
    /// remaining items untouched and in order.
    pub async fn flush(&self) {
        let Ok(_permit) = self.flush_gate.try_acquire() else {
            debug!("Flush already in progress, skipping");
            return;
        };

        while let Some(request) = self.queue.dequeue() {
            let started = Instant::now();
            let result = self.transport.send_request(&request).await;
            self.counters.record_latency(started.elapsed());

            match result {
                Ok(()) => {
                    self.counters.service_success.fetch_add(1, Ordering::Relaxed);
                    if !self.queue.is_empty() {
                        tokio::time::sleep(self.options.flush_delay).await;
                    }
                }
                Err(e) if e.is_recoverable() => {
                    self.counters
                        .recoverable_service_errors
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(error = %e, remaining = self.queue.len() + 1, "Flush interrupted");
                    self.queue.requeue_front(request);
                    break;
                }
                Err(e) => {
                    self.counters
                        .nonrecoverable_service_errors
                        .fetch_add(1, Ordering::Relaxed);
                    error!(error = %e, "Dropping queued batch after non-recoverable failure");
                    break;
                }
            }
        }
        // The permit drops here, releasing the gate on every path.
    }

    /// Delay before retry `attempt` (1-based): `Uniform[0, interval · a) × 100` ms.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let bound = f64::from(self.options.backoff_interval) * f64::from(attempt);
        if bound <= 0.0 {
            return Duration::ZERO;
        }
        let jitter: f64 = rand::thread_rng().gen_range(0.0..bound);
        Duration::from_millis((jitter * 100.0) as u64)
    }

    /// The engine's counters.
    pub fn counters(&self) -> &SinkCounters {
        &self.counters
    }

    /// Current retry-queue length.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Discards every queued batch. Called when the owning sink stops.
    pub fn clear_queue(&self) {
        self.queue.clear();
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// Transport driven by a script of results; records every attempt.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<(), UploadError>>>,
        sent: Mutex<Vec<u32>>,
        hold: Option<Arc<Semaphore>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<(), UploadError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                sent: Mutex::new(Vec::new()),
                hold: None,
            }
        }

        fn attempts(&self) -> Vec<u32> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl UploadTransport for ScriptedTransport {
        type Request = u32;

        async fn send_request(&self, request: &u32) -> Result<(), UploadError> {
            if let Some(hold) = &self.hold {
                let permit = hold.acquire().await.expect("hold semaphore closed");
                permit.forget();
            }
            self.sent.lock().push(*request);
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }
    }

    fn recoverable() -> Result<(), UploadError> {
        Err(UploadError::Recoverable("throttled".into()))
    }

    fn fast_options() -> ReliableSinkOptions {
        ReliableSinkOptions {
            attempt_limit: 3,
            // Keeps the jittered sleeps in the single-millisecond range.
            backoff_interval: 0,
            flush_delay: Duration::ZERO,
            queue_capacity: RETRY_QUEUE_LIMIT,
        }
    }

    #[tokio::test]
    async fn test_success_increments_once_and_skips_queue() {
        let sink = ReliableSink::new(ScriptedTransport::new(vec![Ok(()), Ok(())]), fast_options());

        sink.send(1).await;
        sink.send(2).await;

        let counters = sink.counters().snapshot();
        assert_eq!(counters.service_success, 2);
        assert_eq!(counters.recoverable_service_errors, 0);
        assert_eq!(sink.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_recoverable_failures_then_success() {
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![recoverable(), recoverable(), Ok(())]),
            fast_options(),
        );

        sink.send(7).await;

        let counters = sink.counters().snapshot();
        assert_eq!(counters.recoverable_service_errors, 2);
        assert_eq!(counters.service_success, 1);
        assert_eq!(sink.queue_len(), 0);
        assert_eq!(sink.transport().attempts(), vec![7, 7, 7]);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_demote_to_queue() {
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![recoverable(), recoverable(), recoverable()]),
            fast_options(),
        );

        sink.send(7).await;

        let counters = sink.counters().snapshot();
        assert_eq!(counters.recoverable_service_errors, 3);
        assert_eq!(counters.service_success, 0);
        assert_eq!(sink.queue_len(), 1);
    }

    #[tokio::test]
    async fn test_nonrecoverable_drops_batch() {
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![Err(UploadError::NonRecoverable("rejected".into()))]),
            fast_options(),
        );

        sink.send(7).await;

        let counters = sink.counters().snapshot();
        assert_eq!(counters.nonrecoverable_service_errors, 1);
        assert_eq!(sink.queue_len(), 0);
        assert_eq!(sink.transport().attempts(), vec![7]);
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_oldest_and_counts() {
        let mut options = fast_options();
        options.attempt_limit = 1;
        options.queue_capacity = 3;
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![recoverable(); 4]),
            options,
        );

        for i in 1..=4 {
            sink.send(i).await;
        }

        assert_eq!(sink.queue_len(), 3);
        let counters = sink.counters().snapshot();
        // One overflow eviction on top of the four recoverable failures.
        assert_eq!(counters.nonrecoverable_service_errors, 1);
        assert_eq!(counters.recoverable_service_errors, 4);
    }

    #[tokio::test]
    async fn test_flush_drains_fifo() {
        let mut options = fast_options();
        options.attempt_limit = 1;
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![recoverable(), recoverable(), Ok(()), Ok(())]),
            options,
        );

        sink.send(1).await;
        sink.send(2).await;
        assert_eq!(sink.queue_len(), 2);

        sink.flush().await;

        assert_eq!(sink.queue_len(), 0);
        assert_eq!(sink.counters().snapshot().service_success, 2);
        // Demotion order is preserved in the drain.
        assert_eq!(sink.transport().attempts(), vec![1, 2, 1, 2]);
    }

    #[tokio::test]
    async fn test_flush_failure_preserves_tail_order() {
        let mut options = fast_options();
        options.attempt_limit = 1;
        // Three demotions, then one flush attempt that fails.
        let sink = ReliableSink::new(
            ScriptedTransport::new(vec![
                recoverable(),
                recoverable(),
                recoverable(),
                recoverable(),
            ]),
            options,
        );

        for i in 1..=3 {
            sink.send(i).await;
        }
        sink.flush().await;

        // The failed head went back in front of the untouched tail.
        assert_eq!(sink.queue_len(), 3);
        let mut drained = Vec::new();
        while let Some(item) = sink.queue.dequeue() {
            drained.push(item);
        }
        assert_eq!(drained, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_flush_single_drain() {
        let hold = Arc::new(Semaphore::new(0));
        let mut transport = ScriptedTransport::new(vec![Ok(()), Ok(())]);
        transport.hold = Some(hold.clone());

        let mut options = fast_options();
        options.attempt_limit = 1;
        let sink = Arc::new(ReliableSink::new(transport, options));
        sink.queue.enqueue(1);
        sink.queue.enqueue(2);

        let first = tokio::spawn({
            let sink = sink.clone();
            async move { sink.flush().await }
        });
        // Let the first flusher take the gate and park inside the send.
        tokio::task::yield_now().await;

        // The second flusher must bail out immediately without sending.
        sink.flush().await;
        assert!(sink.transport().attempts().is_empty());

        hold.add_permits(2);
        first.await.unwrap();

        assert_eq!(sink.transport().attempts(), vec![1, 2]);
        assert_eq!(sink.queue_len(), 0);
        assert_eq!(sink.counters().snapshot().service_success, 2);
    }

    #[tokio::test]
    async fn test_backoff_distribution() {
        let options = ReliableSinkOptions {
            backoff_interval: 60,
            ..fast_options()
        };
        let sink = ReliableSink::new(ScriptedTransport::new(vec![]), options);

        for attempt in 1..=3u32 {
            let bound_ms = u64::from(60 * attempt) * 100;
            let mut seen_low = false;
            let mut seen_high = false;
            for _ in 0..500 {
                let delay = sink.backoff_delay(attempt).as_millis() as u64;
                assert!(delay < bound_ms, "delay {delay} out of bound {bound_ms}");
                if delay < bound_ms / 4 {
                    seen_low = true;
                }
                if delay > (bound_ms / 4) * 3 {
                    seen_high = true;
                }
            }
            // Jitter spreads over the whole interval, not a corner of it.
            assert!(seen_low && seen_high);
        }
    }

    #[tokio::test]
    async fn test_zero_interval_means_no_delay() {
        let sink = ReliableSink::new(ScriptedTransport::new(vec![]), fast_options());
        assert_eq!(sink.backoff_delay(1), Duration::ZERO);
    }
}
