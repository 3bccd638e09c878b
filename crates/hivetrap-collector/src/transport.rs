// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use crate::errors::EncodeError;
use crate::queue::QueueEntry;
use crate::stream::StreamTransport;
use crate::udp::UdpTransport;

/// The closed set of delivery transports, selected once at startup from
/// validated config.
#[derive(Debug)]
pub enum Transport {
    /// Connectionless fire-and-forget datagrams.
    Udp(UdpTransport),

    /// TLS-wrapped TCP broadcast to every live collector connection.
    Stream(StreamTransport),

    /// In-memory sink that records drained batches, used by tests.
    #[allow(dead_code)]
    Memory(MemoryTransport),
}

impl Transport {
    /// Hand one drained batch to the transport. Failures the transport can
    /// absorb (socket not ready, no live peers, datagram loss) are handled
    /// internally; only per-batch encoding failures surface.
    pub async fn submit(&self, batch: Vec<QueueEntry>) -> Result<(), EncodeError> {
        match self {
            Transport::Udp(udp) => udp.submit(batch).await,
            Transport::Stream(stream) => stream.submit(batch).await,
            Transport::Memory(memory) => {
                memory.submit(batch);
                Ok(())
            }
        }
    }
}

/// Records every submitted batch instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    batches: Arc<Mutex<Vec<Vec<QueueEntry>>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn submit(&self, batch: Vec<QueueEntry>) {
        #[allow(clippy::expect_used)]
        self.batches.lock().expect("lock poisoned").push(batch);
    }

    /// Snapshot of every batch submitted so far, in submission order.
    pub fn batches(&self) -> Vec<Vec<QueueEntry>> {
        #[allow(clippy::expect_used)]
        let batches = self.batches.lock().expect("lock poisoned");
        batches.clone()
    }
}
