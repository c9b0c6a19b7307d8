use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::state::SessionState;

/// Rejected configuration values. Nothing is clamped; the setting is refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size {0} is not a multiple of 8")]
    WindowNotMultipleOf8(u16),
    #[error("window size {0} is outside [8, 256]")]
    WindowOutOfRange(u16),
    #[error("invalid local address {0:?}")]
    InvalidAddress(String),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("invalid window size {0:?}")]
    InvalidWindow(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("operation not allowed in state {0}")]
    InvalidState(SessionState),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("payload of {len} bytes is shorter than the {min}-byte sequence header")]
    Truncated { len: usize, min: usize },
    #[error("frame of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },
}
