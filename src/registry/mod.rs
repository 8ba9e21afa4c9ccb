//! Stream registry for pub/sub routing
//!
//! The registry maps a stream key to one publisher ([`Reader`]) and a set of
//! subscribers ([`Writer`]) and routes packets between them.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌─────────────────────────┐
//!                     │ streams: HashMap<Key,   │
//!                     │   StreamEntry {         │
//!                     │     publisher,          │
//!                     │     subscribers,        │
//!                     │     cache: GopCache,    │
//!                     │   }                     │
//!                     │ >                       │
//!                     └───────────┬─────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    reader.read()          writer.write()          writer.write()
//!         │                       ▲                       ▲
//!         └──► registry.fan_out() ┴───────────────────────┘
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all subscribers share the same
//! payload allocation. Fan-out clones the [`Packet`], but the inner `Bytes`
//! is only reference-counted, not copied.
//!
//! [`Reader`]: crate::av::Reader
//! [`Writer`]: crate::av::Writer
//! [`Packet`]: crate::av::Packet

pub mod config;
pub mod entry;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{Participant, StreamEntry, StreamState, StreamStats};
pub use store::StreamRegistry;
