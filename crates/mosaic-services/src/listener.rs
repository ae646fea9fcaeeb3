//! Datagram listener — the worker pool in front of the registry.
//!
//! N workers share one UDP socket. Each datagram is decoded into a fragment
//! and handed to the [`MessageRegistry`]. Decode and receive failures go to a
//! bounded error queue; when the queue is full the report is dropped so a
//! slow consumer can never stall ingestion.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use mosaic_core::wire::{decode_datagram, DecodeError, MAX_DATAGRAM};

use crate::registry::MessageRegistry;

/// Create a non-blocking UDP socket bound to `addr`.
///
/// `recv_buffer_bytes` sets SO_RCVBUF; 0 leaves the OS default.
pub fn bind_socket(addr: SocketAddr, recv_buffer_bytes: usize) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;

    socket.set_reuse_address(true).context("SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("set_nonblocking")?;
    if recv_buffer_bytes > 0 {
        socket
            .set_recv_buffer_size(recv_buffer_bytes)
            .context("SO_RCVBUF")?;
    }
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    Ok(socket.into())
}

pub struct DatagramListener {
    socket: Arc<UdpSocket>,
    registry: MessageRegistry,
    errors: mpsc::Sender<ListenerError>,
    workers: usize,
}

impl DatagramListener {
    pub fn new(
        socket: UdpSocket,
        registry: MessageRegistry,
        errors: mpsc::Sender<ListenerError>,
        workers: usize,
    ) -> Self {
        Self {
            socket: Arc::new(socket),
            registry,
            errors,
            workers: workers.max(1),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the workers. Each one exits when `shutdown` fires.
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            addr = ?self.socket.local_addr().ok(),
            workers = self.workers,
            "datagram listener starting"
        );
        (0..self.workers)
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    self.socket.clone(),
                    self.registry.clone(),
                    self.errors.clone(),
                    shutdown.subscribe(),
                ))
            })
            .collect()
    }
}

async fn worker_loop(
    worker: usize,
    socket: Arc<UdpSocket>,
    registry: MessageRegistry,
    errors: mpsc::Sender<ListenerError>,
    mut shutdown: broadcast::Receiver<()>,
) {
    // One spare byte past the largest valid fragment.
    let mut buf = vec![0u8; MAX_DATAGRAM + 1];

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(worker, "listener worker shutting down");
                return;
            }

            received = socket.recv_from(&mut buf) => {
                match received {
                    Ok((len, peer)) => match decode_datagram(&buf[..len]) {
                        Ok(fragment) => {
                            tracing::trace!(
                                worker,
                                %peer,
                                transaction_id = fragment.transaction_id(),
                                offset = fragment.offset(),
                                len = fragment.data_length(),
                                end = fragment.is_end(),
                                "fragment received"
                            );
                            registry.add_fragment(fragment);
                        }
                        Err(source) => report(&errors, ListenerError::Decode { peer, source }),
                    },
                    Err(e) => report(&errors, ListenerError::Recv(e)),
                }
            }
        }
    }
}

fn report(errors: &mpsc::Sender<ListenerError>, err: ListenerError) {
    match errors.try_send(err) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(err)) => {
            tracing::warn!(error = %err, "error queue full, dropping report");
        }
        Err(mpsc::error::TrySendError::Closed(err)) => {
            tracing::trace!(error = %err, "error queue closed");
        }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("malformed datagram from {peer}: {source}")]
    Decode {
        peer: SocketAddr,
        #[source]
        source: DecodeError,
    },

    #[error("recv_from failed: {0}")]
    Recv(#[source] io::Error),
}
