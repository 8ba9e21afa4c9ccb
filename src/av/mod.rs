//! Packet model and stream contracts
//!
//! This module provides:
//! - [`Packet`] and its codec header variants
//! - [`StreamInfo`], the identity attached to every reader and writer
//! - [`RwBase`], per-endpoint timestamp base and liveness
//! - The reader/writer/codec capability traits

pub mod info;
pub mod packet;
pub mod state;
pub mod timestamp;
pub mod traits;

pub use info::StreamInfo;
pub use packet::{AudioHeader, Packet, PacketHeader, VideoHeader};
pub use state::{EndpointState, StateCell};
pub use timestamp::RwBase;
pub use traits::{CodecParser, Demuxer, Endpoint, Handler, Muxer, Reader, SampleRater, Writer};
