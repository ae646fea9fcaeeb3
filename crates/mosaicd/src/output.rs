//! Console output for reassembly results.

use tokio::sync::mpsc;

use mosaic_services::{ListenerError, RegistryEvent};

pub fn format_event(event: &RegistryEvent) -> String {
    match event {
        RegistryEvent::Completed(c) => format!(
            "Message #{} length: {}\nsha256:{}",
            c.transaction_id, c.total_bytes, c.digest
        ),
        RegistryEvent::Hole(h) => format!("Message #{} Hole at: {}", h.transaction_id, h.offset),
    }
}

/// Print every registry event on stdout until the channel closes.
pub async fn print_events(mut events: mpsc::UnboundedReceiver<RegistryEvent>) {
    while let Some(event) = events.recv().await {
        println!("{}", format_event(&event));
    }
}

/// Log listener errors until every worker has exited.
pub async fn log_errors(mut errors: mpsc::Receiver<ListenerError>) {
    while let Some(e) = errors.recv().await {
        match &e {
            ListenerError::Decode { peer, source } => tracing::warn!(
                %peer,
                field = %source.field(),
                error = %e,
                "datagram rejected"
            ),
            ListenerError::Recv(_) => tracing::warn!(error = %e, "receive failed"),
        }
    }
}
