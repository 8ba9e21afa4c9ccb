//! Reader/writer lifecycle
//!
//! `Open -> Closing -> Closed`. `Closing` is entered by the first close call or
//! a liveness timeout; `Closed` is terminal.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of a reader or writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Open,
    Closing,
    Closed,
}

impl EndpointState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EndpointState::Open,
            1 => EndpointState::Closing,
            _ => EndpointState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EndpointState::Open => 0,
            EndpointState::Closing => 1,
            EndpointState::Closed => 2,
        }
    }
}

/// Atomic holder for [`EndpointState`]
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(EndpointState::Open.as_u8()))
    }

    pub fn get(&self) -> EndpointState {
        EndpointState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.get() == EndpointState::Open
    }

    /// Move `Open -> Closing`
    ///
    /// Returns true for the caller that won the transition; later callers get
    /// false and must not release resources again.
    pub fn begin_close(&self) -> bool {
        self.0
            .compare_exchange(
                EndpointState::Open.as_u8(),
                EndpointState::Closing.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Move to the terminal state
    pub fn finish_close(&self) {
        self.0.store(EndpointState::Closed.as_u8(), Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
