// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background flush loop.
//!
//! Each cycle the scheduler draws a fresh size threshold from the
//! configured range, then waits until the queue reaches it, the flush
//! window elapses, or shutdown is requested, whichever comes first, and
//! hands the drained batch to the transport. Re-randomizing the threshold
//! every cycle is deliberate traffic shaping: an observer of the wire
//! cannot recover a fixed polling cadence from batch timing.

use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::{interval, sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::queue::DeliveryQueue;
use crate::transport::Transport;

/// Scheduler lifecycle, published on a watch channel so shutdown can wait
/// on actual completion instead of polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Cycling normally.
    Running,
    /// Shutdown requested; at most one more drain-and-submit pass.
    Stopping,
    /// Terminal.
    Stopped,
}

/// Flush triggers. Defaults match production behavior; tests shrink them.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the size trigger is re-checked.
    pub poll_interval: Duration,
    /// Time trigger: maximum age of a cycle before it flushes regardless
    /// of queue length.
    pub flush_window: Duration,
    /// Size trigger: the threshold is drawn uniformly from this range at
    /// the start of every cycle.
    pub batch_threshold: RangeInclusive<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_interval: Duration::from_secs(1),
            flush_window: Duration::from_secs(60 * 5),
            batch_threshold: 2..=10,
        }
    }
}

pub struct FlushScheduler {
    queue: Arc<DeliveryQueue>,
    transport: Arc<Transport>,
    config: SchedulerConfig,
    cancel: CancellationToken,
    state_tx: watch::Sender<SchedulerState>,
}

impl FlushScheduler {
    pub fn new(
        queue: Arc<DeliveryQueue>,
        transport: Arc<Transport>,
        config: SchedulerConfig,
        cancel: CancellationToken,
    ) -> (Self, watch::Receiver<SchedulerState>) {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Running);
        let scheduler = FlushScheduler {
            queue,
            transport,
            config,
            cancel,
            state_tx,
        };
        (scheduler, state_rx)
    }

    /// The flush loop. Runs until cancelled; per-batch failures are logged
    /// and never terminate the loop. Once a batch is drained it belongs to
    /// the transport; the scheduler never retries or re-queues.
    pub async fn run(self) {
        debug!("flush scheduler started");
        loop {
            let threshold = rand::rng().random_range(self.config.batch_threshold.clone());
            trace!("waiting for {threshold} queued entries or the flush window");

            let stopping = self.wait_for_trigger(threshold).await;
            if stopping {
                let _ = self.state_tx.send(SchedulerState::Stopping);
            }

            let batch = self.queue.drain();
            if !batch.is_empty() {
                debug!("flushing {} queued entries", batch.len());
                if let Err(e) = self.transport.submit(batch).await {
                    error!("failed to encode batch, dropping it: {e}");
                }
            }

            if stopping {
                break;
            }
        }
        let _ = self.state_tx.send(SchedulerState::Stopped);
        debug!("flush scheduler stopped");
    }

    /// Wait for a flush trigger. Returns true when the wait ended because
    /// shutdown was requested.
    async fn wait_for_trigger(&self, threshold: usize) -> bool {
        let deadline = Instant::now() + self.config.flush_window;
        let mut poll = interval(self.config.poll_interval);
        poll.tick().await; // first tick resolves immediately

        loop {
            if self.queue.len() >= threshold {
                return self.cancel.is_cancelled();
            }
            tokio::select! {
                _ = self.cancel.cancelled() => return true,
                _ = sleep_until(deadline) => return false,
                _ = poll.tick() => {}
            }
        }
    }
}
