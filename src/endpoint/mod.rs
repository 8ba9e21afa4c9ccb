//! Reader/writer implementations owned by this crate

pub mod pipe;

pub use pipe::{pipe, Backpressure, PipeConfig, PipeReader, PipeWriter};
