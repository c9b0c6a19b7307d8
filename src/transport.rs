//! Collaborators a [`crate::session::ConnectionSession`] is driven through.
//!
//! Neither trait delivers events itself. Whoever owns the session (see
//! [`crate::server::LossServer`]) observes accepts, readiness, hang-ups and
//! timer expiry and hands them to the session one at a time.

use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

/// Stream transport holding one listening socket and any accepted connections.
pub trait Transport {
    /// Identifies an accepted connection.
    type Handle: Copy + Eq + Debug;

    /// Binds the listening socket and returns the address actually bound.
    ///
    /// # Arguments
    /// * `local` - Address to bind; port 0 picks an ephemeral port
    fn bind(&mut self, local: SocketAddr) -> io::Result<SocketAddr>;

    /// Starts accepting connections on the bound socket.
    fn listen(&mut self) -> io::Result<()>;

    /// Stops accepting. Connections already accepted are left alone.
    fn stop_listening(&mut self);

    /// Turns readiness notifications for `handle` on or off. Data arriving
    /// while they are off is discarded.
    fn set_read_interest(&mut self, handle: Self::Handle, interested: bool);

    /// Pops the next buffered message, `None` once the buffer is drained.
    /// Never waits for more data.
    fn receive_next(&mut self, handle: Self::Handle) -> Option<Bytes>;

    /// Writes `payload` without blocking.
    ///
    /// # Returns
    /// The number of bytes accepted by the transport. A full buffer or a
    /// vanished peer is reported as an error.
    fn send(&mut self, handle: Self::Handle, payload: &[u8]) -> io::Result<usize>;

    /// Closes `handle` and frees everything attached to it.
    fn close(&mut self, handle: Self::Handle);
}

/// One-shot delayed actions.
///
/// Firing is reported back to the owner with the token returned by
/// [`Scheduler::schedule_once`]; the owner passes it on to the session.
pub trait Scheduler {
    type Timer: Copy + Eq + Debug;

    /// Arms a timer that fires once after `delay`.
    fn schedule_once(&mut self, delay: Duration) -> Self::Timer;

    /// Cancels `timer`. Cancelling a timer that already fired is a no-op.
    fn cancel(&mut self, timer: Self::Timer);
}
