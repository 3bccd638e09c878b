// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connectionless transport: one envelope per datagram, fire-and-forget.
//!
//! Batches submitted before the socket is connected are held in a pending
//! list and replayed in FIFO order on the ready event; after that every
//! submit encodes and writes immediately. There is no acknowledgement and
//! no retry.

use tokio::net::UdpSocket;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, error, info, warn};

use crate::envelope::EnvelopeCodec;
use crate::errors::EncodeError;
use crate::queue::QueueEntry;

pub struct UdpTransport {
    codec: EnvelopeCodec,
    socket: OnceCell<UdpSocket>,
    // Pending lock doubles as the ordering barrier between buffering
    // submits and the replay in `connect`; submits re-check the socket
    // while holding it.
    pending: Mutex<Vec<Vec<QueueEntry>>>,
}

impl UdpTransport {
    pub fn new(codec: EnvelopeCodec) -> Self {
        UdpTransport {
            codec,
            socket: OnceCell::new(),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Submit one batch. Before the socket is ready the batch is buffered;
    /// this is the expected startup path, not an error.
    pub async fn submit(&self, batch: Vec<QueueEntry>) -> Result<(), EncodeError> {
        {
            let mut pending = self.pending.lock().await;
            if self.socket.get().is_none() {
                debug!("udp socket not connected yet, queueing batch");
                pending.push(batch);
                return Ok(());
            }
        }

        let payload = self.codec.encode(&batch)?;
        self.send(&payload).await;
        Ok(())
    }

    /// Bind, connect to the collector, then replay the pending list in
    /// FIFO order, one datagram per batch.
    pub async fn connect(&self, host: &str, port: u16) -> std::io::Result<()> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;

        let mut pending = self.pending.lock().await;
        self.socket
            .set(socket)
            .map_err(|_| std::io::Error::other("udp transport already connected"))?;
        info!("udp transport ready, target {host}:{port}");

        if !pending.is_empty() {
            debug!("replaying {} batches queued before socket ready", pending.len());
        }
        for batch in pending.drain(..) {
            match self.codec.encode(&batch) {
                Ok(payload) => self.send(&payload).await,
                Err(e) => error!("failed to encode queued batch, dropping it: {e}"),
            }
        }
        Ok(())
    }

    async fn send(&self, payload: &[u8]) {
        let Some(socket) = self.socket.get() else {
            return;
        };
        // Best-effort delivery: a failed datagram write is logged and the
        // batch dropped.
        if let Err(e) = socket.send(payload).await {
            warn!("udp send failed, dropping batch: {e}");
        }
    }
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("connected", &self.socket.get().is_some())
            .finish_non_exhaustive()
    }
}
