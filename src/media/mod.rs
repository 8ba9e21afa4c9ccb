//! Codec collaborators for RTMP media
//!
//! This module provides:
//! - FLV tag header demuxing and FLV stream muxing
//! - AAC configuration parsing and ADTS re-framing
//! - GOP caching for late-joiner support

pub mod aac;
pub mod flv;
pub mod gop;

pub use aac::{AacParser, AudioSpecificConfig};
pub use flv::{AudioFormat, FlvDemuxer, FlvMuxer, VideoCodec, VideoFrameType};
pub use gop::GopCache;
