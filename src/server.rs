//! Event loop that drives a [`ConnectionSession`] over tokio TCP.
//!
//! Accepts, frame batches, hang-ups and timer expiries all arrive on one
//! bounded channel and are handled strictly one after another by
//! [`LossServer::run`], so the session needs no locking. A [`SessionStats`]
//! snapshot is published on a watch channel after every event.

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use log::{debug, info};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::session::{ConnectionSession, SessionStats};
use crate::socket::{ConnectionId, TcpTransport};
use crate::state::SessionState;
use crate::timer::{TimerId, TokioScheduler};

const CHANNEL_LEN: usize = 100;

pub(crate) enum Event {
    Incoming(TcpStream, SocketAddr),
    Frames(ConnectionId, Vec<Bytes>),
    Hangup(ConnectionId),
    TimerFired(TimerId),
}

pub struct LossServer {
    session: ConnectionSession<TcpTransport, TokioScheduler>,
    events: mpsc::Receiver<Event>,
    stats: watch::Sender<SessionStats>,
}

impl LossServer {
    /// Binds and starts listening. Must be called from within a tokio runtime.
    pub fn bind(config: ServerConfig) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel(CHANNEL_LEN);
        let transport = TcpTransport::new(tx.clone());
        let scheduler = TokioScheduler::new(tx);

        let mut session = ConnectionSession::new(config, transport, scheduler);
        session.start()?;
        let (stats, _) = watch::channel(session.stats());

        Ok(Self {
            session,
            events: rx,
            stats,
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.session.local_addr()
    }

    /// Snapshots taken between events; never observes a half-processed batch.
    pub fn subscribe(&self) -> watch::Receiver<SessionStats> {
        self.stats.subscribe()
    }

    /// Runs until the peer disconnects or `shutdown` completes, then returns
    /// the final counters.
    pub async fn run<F>(mut self, shutdown: F) -> SessionStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while self.session.state() != SessionState::Closed {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    self.session.stop();
                }
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        debug!("event channel closed");
                        self.session.stop();
                    }
                },
            }
            self.stats.send_replace(self.session.stats());
        }

        let stats = self.session.stats();
        info!("final stats: {}", stats);
        stats
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Incoming(stream, peer) => {
                let id = self.session.transport_mut().adopt(stream, peer);
                self.session.handle_accept(id, peer);
            }
            Event::Frames(id, frames) => {
                if self.session.transport_mut().deliver(id, frames) {
                    self.session.handle_readable(id);
                }
            }
            Event::Hangup(id) => self.session.handle_close(id),
            Event::TimerFired(timer) => self.session.handle_timer(timer),
        }
    }
}
