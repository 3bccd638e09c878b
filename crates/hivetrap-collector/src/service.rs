// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector client lifecycle: validate config, build the transport
//! variant, run the flush scheduler, and flush a final sentinel batch on
//! graceful shutdown.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{CollectorConfig, Protocol};
use crate::envelope::EnvelopeCodec;
use crate::errors::ConfigError;
use crate::queue::DeliveryQueue;
use crate::scheduler::{FlushScheduler, SchedulerConfig, SchedulerState};
use crate::stream::StreamTransport;
use crate::transport::Transport;
use crate::udp::UdpTransport;

/// Service name carried by the shutdown sentinel entry.
pub const SENTINEL_SERVICE: &str = "hivetrap";

const UDP_CONNECT_BACKOFF_INITIAL: Duration = Duration::from_millis(100);
const UDP_CONNECT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Builder for one running collector client.
pub struct CollectorService {
    config: CollectorConfig,
    scheduler_config: SchedulerConfig,
}

impl CollectorService {
    pub fn new(config: CollectorConfig) -> Self {
        CollectorService {
            config,
            scheduler_config: SchedulerConfig::default(),
        }
    }

    /// Override the flush triggers (shorter windows for tests).
    pub fn with_scheduler_config(mut self, scheduler_config: SchedulerConfig) -> Self {
        self.scheduler_config = scheduler_config;
        self
    }

    /// Validate the config, construct the transport matching its protocol,
    /// and launch the flush scheduler in the background.
    ///
    /// A bad config fails here, before anything is spawned.
    pub fn start(self) -> Result<CollectorHandle, ConfigError> {
        self.config.validate()?;
        let codec = EnvelopeCodec::new(&self.config)?;

        let cancel = CancellationToken::new();
        let transport = match self.config.protocol {
            Protocol::Udp => Arc::new(Transport::Udp(UdpTransport::new(codec))),
            Protocol::TcpSsl => {
                let stream = StreamTransport::new(codec, cancel.child_token())?;
                stream.connect_peer(self.config.host.clone(), self.config.port);
                Arc::new(Transport::Stream(stream))
            }
        };

        if self.config.protocol == Protocol::Udp {
            spawn_udp_connect(
                Arc::clone(&transport),
                self.config.host.clone(),
                self.config.port,
                cancel.child_token(),
            );
        }

        let queue = Arc::new(DeliveryQueue::new());
        let (scheduler, state_rx) = FlushScheduler::new(
            Arc::clone(&queue),
            transport,
            self.scheduler_config,
            cancel.clone(),
        );
        tokio::spawn(scheduler.run());

        info!(
            "collector client started, {} transport to {}:{}",
            self.config.protocol, self.config.host, self.config.port
        );
        Ok(CollectorHandle {
            queue,
            cancel,
            state_rx,
        })
    }
}

/// Handle to a running collector client.
///
/// Cloneable; producers keep one to enqueue observations, the process
/// bootstrap keeps one to drive graceful shutdown.
#[derive(Clone)]
pub struct CollectorHandle {
    queue: Arc<DeliveryQueue>,
    cancel: CancellationToken,
    state_rx: tokio::sync::watch::Receiver<SchedulerState>,
}

impl CollectorHandle {
    /// Producer interface: append one observation. Never blocks on I/O.
    pub fn enqueue(&self, service: &str, data: serde_json::Value) {
        self.queue.push(service, data);
    }

    /// Current scheduler state.
    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Graceful shutdown: enqueue the shutdown sentinel so it rides in the
    /// final batch, stop the scheduler, and wait until it reports
    /// `Stopped`. Returns only after the final flush completed. Idempotent.
    pub async fn drain_and_stop(&self) {
        if self.state() == SchedulerState::Stopped {
            return;
        }
        self.enqueue(
            SENTINEL_SERVICE,
            serde_json::json!("hivetrap agent shutting down"),
        );
        self.cancel.cancel();

        let mut state_rx = self.state_rx.clone();
        let _ = state_rx.wait_for(|s| *s == SchedulerState::Stopped).await;
        info!("collector client stopped");
    }
}

impl std::fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("state", &self.state())
            .field("queued", &self.queue.len())
            .finish()
    }
}

/// Establish the UDP socket in the background; batches drained before it
/// is ready stay in the transport's pending list and are replayed once it
/// connects.
fn spawn_udp_connect(
    transport: Arc<Transport>,
    host: String,
    port: u16,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        let Transport::Udp(udp) = transport.as_ref() else {
            return;
        };
        let mut backoff = UDP_CONNECT_BACKOFF_INITIAL;
        loop {
            match udp.connect(&host, port).await {
                Ok(()) => return,
                Err(e) => warn!("udp transport not ready ({e}), retrying"),
            }
            tokio::select! {
                _ = sleep(backoff) => {}
                _ = cancel.cancelled() => return,
            }
            backoff = (backoff * 2).min(UDP_CONNECT_BACKOFF_MAX);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(protocol: Protocol) -> CollectorConfig {
        CollectorConfig {
            instance_key: "i".to_string(),
            mac_key: "m".to_string(),
            encryption_key: "e".to_string(),
            host: "127.0.0.1".to_string(),
            port: 2244,
            protocol,
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut bad = config(Protocol::Udp);
        bad.instance_key = String::new();
        assert!(CollectorService::new(bad).start().is_err());
    }

    #[tokio::test]
    async fn test_drain_and_stop_is_idempotent() {
        let handle = CollectorService::new(config(Protocol::Udp))
            .start()
            .unwrap();
        handle.drain_and_stop().await;
        assert_eq!(handle.state(), SchedulerState::Stopped);
        handle.drain_and_stop().await;
        assert_eq!(handle.state(), SchedulerState::Stopped);
    }
}
