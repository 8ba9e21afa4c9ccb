//! Live media relay core
//!
//! Accepts publishers carrying audio/video packets, keeps per-endpoint timestamp
//! bases and liveness, fans each published stream out to its subscribers, and
//! runs operator-controlled pull/push relay sessions against remote endpoints.
//!
//! ```text
//!   transport ──► Reader ──► StreamRegistry::fan_out ──► Writer ──► transport
//!                                 ▲        │
//!                  RelayManager ──┘        └──► live_stats() ──► ControlPlane
//! ```
//!
//! Wire handshakes, chunk framing and HTTP routing live outside this crate and
//! plug in through the [`av::Reader`], [`av::Writer`] and
//! [`relay::RelayConnector`] traits.

pub mod av;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod media;
pub mod registry;
pub mod relay;
pub mod server;
pub mod stats;

pub use av::{Packet, PacketHeader, Reader, StreamInfo, Writer};
pub use error::{Error, Result};
pub use registry::{RegistryConfig, StreamRegistry};
pub use relay::{RelayConfig, RelayManager, RelayOperation};
pub use server::{MediaServer, ServerConfig};
