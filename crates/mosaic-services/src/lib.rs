//! mosaic-services — the concurrent reassembly registry and the datagram
//! listener that feeds it.

pub mod listener;
pub mod notify;
pub mod registry;
pub mod stats;

pub use listener::{bind_socket, DatagramListener, ListenerError};
pub use notify::{report_hole, Completion, Notifier, RegistryEvent};
pub use registry::{MessageRegistry, Progress};
pub use stats::{RegistryStats, StatsSnapshot};
