//! Mosaic integration test harness.
//!
//! Each test binds its own listener on a loopback ephemeral port, sends
//! encoded fragments over real UDP and watches the registry event stream.
//!
//!   cargo test --test integration

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use mosaic_core::Fragment;
use mosaic_services::{
    bind_socket, DatagramListener, ListenerError, MessageRegistry, Notifier, RegistryEvent,
};

mod failures;
mod reassembly;

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for a single event before failing.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running listener plus the handles a test needs to drive it.
pub struct Node {
    pub addr: SocketAddr,
    pub registry: MessageRegistry,
    pub events: mpsc::UnboundedReceiver<RegistryEvent>,
    pub errors: mpsc::Receiver<ListenerError>,
    pub shutdown: broadcast::Sender<()>,
    pub workers: Vec<JoinHandle<()>>,
}

impl Node {
    pub async fn start(cleanup_delay: Duration, workers: usize) -> Result<Self> {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::channel(64);
        let registry = MessageRegistry::new(cleanup_delay, Notifier::new().events(event_tx));

        let socket = bind_socket("127.0.0.1:0".parse()?, 0)?;
        let socket = UdpSocket::from_std(socket).context("tokio socket")?;
        let listener = DatagramListener::new(socket, registry.clone(), error_tx, workers);
        let addr = listener.local_addr()?;

        let (shutdown, _) = broadcast::channel(1);
        let workers = listener.spawn(&shutdown);

        Ok(Self {
            addr,
            registry,
            events,
            errors,
            shutdown,
            workers,
        })
    }

    pub async fn next_event(&mut self) -> Result<RegistryEvent> {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .context("timed out waiting for registry event")?
            .context("event channel closed")
    }

    pub async fn next_error(&mut self) -> Result<ListenerError> {
        tokio::time::timeout(EVENT_TIMEOUT, self.errors.recv())
            .await
            .context("timed out waiting for listener error")?
            .context("error channel closed")
    }

    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for worker in self.workers {
            tokio::time::timeout(EVENT_TIMEOUT, worker)
                .await
                .context("worker did not exit")??;
        }
        Ok(())
    }
}

/// Split `payload` into fragments of at most `chunk` bytes, the last one
/// flagged as the end.
pub fn split(transaction_id: u32, payload: &[u8], chunk: usize) -> Vec<Fragment> {
    let pieces: Vec<&[u8]> = payload.chunks(chunk).collect();
    let last = pieces.len().saturating_sub(1);
    let mut offset = 0u32;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let fragment = Fragment::new(i == last, transaction_id, offset, piece.to_vec())
                .expect("chunk fits in a datagram");
            offset += piece.len() as u32;
            fragment
        })
        .collect()
}

pub fn shuffled(mut fragments: Vec<Fragment>) -> Vec<Fragment> {
    fragments.shuffle(&mut rand::thread_rng());
    fragments
}

pub async fn send_all(to: SocketAddr, fragments: &[Fragment]) -> Result<()> {
    let client = UdpSocket::bind("127.0.0.1:0").await?;
    for fragment in fragments {
        client.send_to(&fragment.encode(), to).await?;
        // Loopback drops bursts once the receive buffer fills.
        tokio::task::yield_now().await;
    }
    Ok(())
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
