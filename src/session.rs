//! Single-peer connection lifecycle around a [`SequenceLossTracker`].
//!
//! The session owns the transport and scheduler it is given and reacts to
//! four events: accept, readable, close and timer expiry. Each readable
//! event drains every buffered message into the tracker and then re-arms a
//! one-shot reply timer; when that timer fires a fixed zero-filled payload
//! goes back to the peer. The reply never depends on what was received.

use std::fmt;
use std::net::SocketAddr;

use log::{debug, info, trace, warn};

use crate::config::{ServerConfig, WindowSize};
use crate::error::{ConfigError, SessionError};
use crate::loss_counter::SequenceLossTracker;
use crate::packet::SeqTsHeader;
use crate::state::SessionState;
use crate::time::Timestamp;
use crate::transport::{Scheduler, Transport};

/// Point-in-time view of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub state: SessionState,
    pub received: u64,
    pub lost: u32,
    pub sent: u64,
    pub send_failures: u64,
    pub window_size: u16,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} received={} lost={} sent={} send_failures={} window={}",
            self.state, self.received, self.lost, self.sent, self.send_failures, self.window_size
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Peer<H> {
    handle: H,
    addr: SocketAddr,
}

pub struct ConnectionSession<T: Transport, S: Scheduler> {
    config: ServerConfig,
    state: SessionState,
    transport: T,
    scheduler: S,
    tracker: SequenceLossTracker,
    peer: Option<Peer<T::Handle>>,
    pending_reply: Option<S::Timer>,
    local_addr: Option<SocketAddr>,
    received: u64,
    sent: u64,
    send_failures: u64,
    reply: Vec<u8>,
}

impl<T: Transport, S: Scheduler> ConnectionSession<T, S> {
    pub fn new(config: ServerConfig, transport: T, scheduler: S) -> Self {
        let reply = vec![0u8; config.reply_size];
        Self {
            tracker: SequenceLossTracker::new(config.window_size),
            config,
            state: SessionState::Idle,
            transport,
            scheduler,
            peer: None,
            pending_reply: None,
            local_addr: None,
            received: 0,
            sent: 0,
            send_failures: 0,
            reply,
        }
    }

    /// `Idle -> Listening`. A bind or listen failure leaves the session `Idle`
    /// and is returned to the caller; it is never retried here.
    pub fn start(&mut self) -> Result<SocketAddr, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState(self.state));
        }
        let addr = self.config.socket_addr();
        let bound = self
            .transport
            .bind(addr)
            .map_err(|source| SessionError::Bind { addr, source })?;
        self.transport
            .listen()
            .map_err(|source| SessionError::Listen { addr: bound, source })?;

        self.local_addr = Some(bound);
        self.state = SessionState::Listening;
        info!("listening on {} (window {})", bound, self.tracker.window_size());
        Ok(bound)
    }

    /// Every connection is admitted. The newest one becomes the tracked peer;
    /// a previously tracked peer is released and closed.
    pub fn handle_accept(&mut self, handle: T::Handle, from: SocketAddr) {
        match self.state {
            SessionState::Listening | SessionState::Connected => {}
            state => {
                warn!("rejecting connection from {} in state {}", from, state);
                self.transport.close(handle);
                return;
            }
        }

        if let Some(old) = self.peer.take() {
            warn!("connection from {} supersedes peer {}", from, old.addr);
            self.transport.set_read_interest(old.handle, false);
            self.transport.close(old.handle);
        }

        info!("accepted connection from {}", from);
        self.transport.set_read_interest(handle, true);
        self.peer = Some(Peer { handle, addr: from });
        self.state = SessionState::Connected;
    }

    /// Drains every buffered message on `handle`, then re-arms the reply timer.
    pub fn handle_readable(&mut self, handle: T::Handle) {
        let peer = match self.peer {
            Some(peer) if peer.handle == handle && self.state == SessionState::Connected => peer,
            _ => {
                debug!("ignoring readiness on untracked connection {:?}", handle);
                return;
            }
        };

        let mut batch = 0usize;
        while let Some(payload) = self.transport.receive_next(handle) {
            if payload.is_empty() {
                continue;
            }
            match SeqTsHeader::parse(&payload) {
                Ok(header) => {
                    let now = Timestamp::now();
                    trace!(
                        "RX {} bytes from {} seq {} tx {} rx {} delay {}",
                        payload.len(),
                        peer.addr,
                        header.seq,
                        header.ts,
                        now,
                        now.delay_since(header.ts)
                    );
                    self.tracker.notify_received(header.seq);
                    self.received += 1;
                    batch += 1;
                }
                Err(e) => warn!("skipping message from {}: {}", peer.addr, e),
            }
        }
        debug!(
            "drained {} messages from {} (received {}, lost {})",
            batch,
            peer.addr,
            self.received,
            self.tracker.lost()
        );

        self.arm_reply();
    }

    /// `Connected -> Closing -> Closed` when the tracked peer goes away.
    pub fn handle_close(&mut self, handle: T::Handle) {
        let is_peer = self.peer.is_some_and(|peer| peer.handle == handle);
        if !is_peer {
            debug!("untracked connection {:?} closed", handle);
            self.transport.close(handle);
            return;
        }

        self.state = SessionState::Closing;
        if let Some(peer) = self.peer.take() {
            info!("peer {} closed the connection", peer.addr);
            self.transport.set_read_interest(peer.handle, false);
            self.transport.close(peer.handle);
        }
        self.cancel_reply();
        self.transport.stop_listening();
        self.state = SessionState::Closed;
        info!("session closed: {}", self.stats());
    }

    /// Sends the reply if `timer` is the one currently armed; stale timers are ignored.
    pub fn handle_timer(&mut self, timer: S::Timer) {
        if self.pending_reply != Some(timer) {
            trace!("ignoring stale timer {:?}", timer);
            return;
        }
        self.pending_reply = None;
        self.send_reply();
    }

    /// `Listening/Connected -> Closed`. Read notifications stop and no more
    /// connections are accepted, but an active connection is not closed.
    pub fn stop(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.transport.stop_listening();
        if let Some(peer) = self.peer {
            self.transport.set_read_interest(peer.handle, false);
        }
        self.cancel_reply();
        self.state = SessionState::Closed;
        info!("session stopped: {}", self.stats());
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn lost(&self) -> u32 {
        self.tracker.lost()
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn window_size(&self) -> u16 {
        self.tracker.window_size().get()
    }

    pub fn set_window_size(&mut self, size: u16) -> Result<(), ConfigError> {
        self.tracker.set_window_size(size)?;
        self.config.window_size = WindowSize::try_from(size)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer.map(|peer| peer.addr)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state,
            received: self.received,
            lost: self.tracker.lost(),
            sent: self.sent,
            send_failures: self.send_failures,
            window_size: self.window_size(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    fn arm_reply(&mut self) {
        self.cancel_reply();
        self.pending_reply = Some(self.scheduler.schedule_once(self.config.reply_delay));
    }

    fn cancel_reply(&mut self) {
        if let Some(timer) = self.pending_reply.take() {
            self.scheduler.cancel(timer);
        }
    }

    fn send_reply(&mut self) {
        let Some(peer) = self.peer else {
            debug!("reply timer fired without a peer");
            return;
        };
        match self.transport.send(peer.handle, &self.reply) {
            Ok(n) => {
                self.sent += 1;
                debug!("sent {} byte reply to {}", n, peer.addr);
            }
            Err(e) => {
                self.send_failures += 1;
                warn!("failed to send {} bytes to {}: {}", self.reply.len(), peer.addr, e);
            }
        }
    }
}
