//! mosaic-core — wire format, fragment ordering, and per-transaction
//! reassembly state. All other mosaic crates depend on this one.

pub mod config;
pub mod message;
pub mod store;
pub mod wire;

pub use message::{AddFragmentError, Hole, IncompleteMessage, Message};
pub use store::OrderedFragments;
pub use wire::{DecodeError, Fragment, FragmentHeader, WireField};
