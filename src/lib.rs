//! `lossmon`: a stream endpoint that counts lost sequence numbers.
//!
//! Peers send length-prefixed messages carrying a sequence number and a send
//! timestamp ([`packet`]). A [`session::ConnectionSession`] feeds each
//! sequence number to a bounded-memory [`loss_counter::SequenceLossTracker`]
//! and, shortly after each burst, answers with a fixed-size reply.
//!
//! - [`config`]: validated window size and server settings
//! - [`loss_counter`]: sliding-window loss detector
//! - [`session`]: single-peer lifecycle state machine
//! - [`transport`]: transport and scheduler traits the session is driven through
//! - [`socket`]: tokio TCP transport
//! - [`timer`]: tokio one-shot scheduler
//! - [`server`]: event loop tying the above together
//! - [`client`]: traffic generator speaking the same wire format

pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod loss_counter;
pub mod packet;
pub mod server;
pub mod session;
pub mod socket;
pub mod state;
pub mod time;
pub mod timer;
pub mod transport;

pub use config::{ServerConfig, WindowSize};
pub use error::{ConfigError, FrameError, SessionError};
pub use loss_counter::SequenceLossTracker;
pub use server::LossServer;
pub use session::{ConnectionSession, SessionStats};
pub use state::SessionState;
