//! Statistics and metrics

pub mod metrics;

pub use metrics::{LiveStats, StreamStat, TrafficMeter, TrafficSnapshot, DEFAULT_TRAFFIC_INTERVAL};
