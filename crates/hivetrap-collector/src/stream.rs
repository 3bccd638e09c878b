// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection-oriented transport: TLS-wrapped TCP with multi-peer
//! broadcast.
//!
//! The transport tracks a dynamic set of live collector connections. Each
//! peer is an independent connection with its own writer task fed through
//! an unbounded channel, so `submit` never blocks on a slow peer; it
//! encodes the envelope once and hands the same bytes to every live
//! connection. With no live peers the batch is dropped: best-effort
//! semantics, there is no client-side retry queue beyond the delivery
//! queue's own batching window.
//!
//! Frames on the wire are newline-delimited JSON envelopes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::envelope::EnvelopeCodec;
use crate::errors::{ConfigError, EncodeError};
use crate::queue::QueueEntry;

const RECONNECT_BACKOFF_INITIAL: Duration = Duration::from_millis(500);
const RECONNECT_BACKOFF_MAX: Duration = Duration::from_secs(30);

struct Peer {
    id: u64,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

/// Owned set of live collector connections.
///
/// Mutated only by the connection maintenance tasks (register on
/// handshake, deregister on disconnect) and read by `broadcast`; the same
/// single-lock discipline as the delivery queue.
#[derive(Default)]
pub(crate) struct PeerSet {
    peers: Mutex<Vec<Peer>>,
    next_id: AtomicU64,
}

impl PeerSet {
    fn register(&self, tx: mpsc::UnboundedSender<Vec<u8>>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        #[allow(clippy::expect_used)]
        self.peers.lock().expect("lock poisoned").push(Peer { id, tx });
        id
    }

    fn deregister(&self, id: u64) {
        #[allow(clippy::expect_used)]
        self.peers.lock().expect("lock poisoned").retain(|p| p.id != id);
    }

    /// Hand the payload to every live peer's writer. Peers whose writer is
    /// gone are pruned on the spot. Returns how many peers accepted the
    /// payload.
    fn broadcast(&self, payload: &[u8]) -> usize {
        #[allow(clippy::expect_used)]
        let mut peers = self.peers.lock().expect("lock poisoned");
        peers.retain(|p| p.tx.send(payload.to_vec()).is_ok());
        peers.len()
    }

    fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        let peers = self.peers.lock().expect("lock poisoned");
        peers.len()
    }
}

pub struct StreamTransport {
    codec: EnvelopeCodec,
    peers: Arc<PeerSet>,
    connector: TlsConnector,
    cancel: CancellationToken,
}

impl StreamTransport {
    pub fn new(codec: EnvelopeCodec, cancel: CancellationToken) -> Result<Self, ConfigError> {
        Ok(StreamTransport {
            codec,
            peers: Arc::new(PeerSet::default()),
            connector: TlsConnector::from(tls_client_config()?),
            cancel,
        })
    }

    /// Encode once, broadcast to every live connection.
    pub async fn submit(&self, batch: Vec<QueueEntry>) -> Result<(), EncodeError> {
        let mut payload = self.codec.encode(&batch)?;
        payload.push(b'\n');

        let delivered = self.peers.broadcast(&payload);
        if delivered == 0 {
            debug!("no live collector connections, dropping batch of {}", batch.len());
        } else {
            debug!("broadcast batch of {} to {delivered} collector connections", batch.len());
        }
        Ok(())
    }

    /// Number of currently-live collector connections.
    pub fn live_peers(&self) -> usize {
        self.peers.len()
    }

    /// Spawn a maintenance task that keeps one connection to the given
    /// collector alive: dial, handshake, register, pump writes, and on
    /// loss deregister and redial with backoff until cancelled. Calling
    /// this more than once dials multiple collector replicas.
    pub fn connect_peer(&self, host: String, port: u16) {
        let peers = Arc::clone(&self.peers);
        let connector = self.connector.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            maintain_peer(peers, connector, cancel, host, port).await;
        });
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("live_peers", &self.peers.len())
            .finish_non_exhaustive()
    }
}

async fn maintain_peer(
    peers: Arc<PeerSet>,
    connector: TlsConnector,
    cancel: CancellationToken,
    host: String,
    port: u16,
) {
    let mut backoff = RECONNECT_BACKOFF_INITIAL;
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match dial(&connector, &host, port).await {
            Ok(stream) => {
                backoff = RECONNECT_BACKOFF_INITIAL;
                info!("connected to collector {host}:{port}");
                let reason = serve_connection(&peers, &cancel, stream).await;
                match reason {
                    Some(reason) => warn!("collector connection {host}:{port} lost: {reason}"),
                    None => return, // cancelled
                }
            }
            Err(e) => {
                warn!("failed to connect to collector {host}:{port}: {e}");
            }
        }

        tokio::select! {
            _ = sleep(backoff) => {}
            _ = cancel.cancelled() => return,
        }
        backoff = (backoff * 2).min(RECONNECT_BACKOFF_MAX);
    }
}

/// Pump one live connection until it drops. Returns the loss reason, or
/// `None` when the transport was cancelled.
async fn serve_connection(
    peers: &PeerSet,
    cancel: &CancellationToken,
    stream: tokio_rustls::client::TlsStream<TcpStream>,
) -> Option<String> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let id = peers.register(tx);

    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut readbuf = [0u8; 1024];

    let reason = loop {
        tokio::select! {
            payload = rx.recv() => match payload {
                Some(payload) => {
                    if let Err(e) = writer.write_all(&payload).await {
                        break Some(format!("write failed: {e}"));
                    }
                }
                None => break Some("transport dropped".to_string()),
            },
            // The collector sends nothing in normal operation; a read here
            // either notices the remote close or drains TLS records.
            read = reader.read(&mut readbuf) => match read {
                Ok(0) => break Some("closed by collector".to_string()),
                Ok(_) => {}
                Err(e) => break Some(format!("read failed: {e}")),
            },
            _ = cancel.cancelled() => {
                let _ = writer.shutdown().await;
                break None;
            }
        }
    };

    peers.deregister(id);
    reason
}

async fn dial(
    connector: &TlsConnector,
    host: &str,
    port: u16,
) -> std::io::Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let tcp = TcpStream::connect((host, port)).await?;
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(std::io::Error::other)?;
    connector.connect(server_name, tcp).await
}

fn tls_client_config() -> Result<Arc<rustls::ClientConfig>, ConfigError> {
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        warn!("some system trust roots failed to load: {:?}", loaded.errors);
    }

    let mut roots = rustls::RootCertStore::empty();
    roots.add_parsable_certificates(loaded.certs);
    if roots.is_empty() {
        return Err(ConfigError::Tls("no usable system trust roots".to_string()));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_every_peer() {
        let peers = PeerSet::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        peers.register(tx_a);
        peers.register(tx_b);
        peers.register(tx_c);

        let delivered = peers.broadcast(b"envelope\n");
        assert_eq!(delivered, 3);
        for rx in [&mut rx_a, &mut rx_b, &mut rx_c] {
            assert_eq!(rx.try_recv().unwrap(), b"envelope\n");
        }
    }

    #[test]
    fn test_broadcast_with_no_peers_is_a_silent_drop() {
        let peers = PeerSet::default();
        assert_eq!(peers.broadcast(b"envelope\n"), 0);
    }

    #[test]
    fn test_lost_peer_does_not_stop_the_others() {
        let peers = PeerSet::default();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        peers.register(tx_a);
        peers.register(tx_b);
        peers.register(tx_c);

        // Peer b's writer is gone: the broadcast prunes it and still
        // reaches a and c.
        drop(rx_b);
        let delivered = peers.broadcast(b"x");
        assert_eq!(delivered, 2);
        assert_eq!(peers.len(), 2);
        assert_eq!(rx_a.try_recv().unwrap(), b"x");
        assert_eq!(rx_c.try_recv().unwrap(), b"x");
    }

    #[test]
    fn test_deregister_removes_only_that_peer() {
        let peers = PeerSet::default();
        let (tx_a, _rx_a) = mpsc::unbounded_channel();
        let (tx_b, _rx_b) = mpsc::unbounded_channel();
        let a = peers.register(tx_a);
        peers.register(tx_b);

        peers.deregister(a);
        assert_eq!(peers.len(), 1);
    }
}
