//! Pull/push relay sessions
//!
//! A pull session plays a remote stream and publishes it into the local
//! registry; a push session subscribes to a local stream and publishes it to a
//! remote server. Each session runs one pump task:
//!
//! ```text
//!   pull:  remote Reader ──pump──► PipeWriter ══► PipeReader ──► registry (publisher)
//!   push:  registry (subscriber) ──► PipeWriter ══► PipeReader ──pump──► remote Writer
//! ```

pub mod config;
pub mod connector;
pub mod manager;
pub mod session;

pub use config::RelayConfig;
pub use connector::RelayConnector;
pub use manager::RelayManager;
pub use session::{session_key, RelayOperation, SessionInfo};
