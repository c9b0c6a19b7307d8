use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;

use crate::packet::decode_frame;
use crate::server::Event;
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 17480;
const LISTEN_BACKLOG: u32 = 1024;
const WRITE_QUEUE_LEN: usize = 100;

pub type ConnectionId = u64;

struct Connection {
    peer: SocketAddr,
    /// Whole payloads waiting for the writer task; dropping it ends the task
    /// once the queue is flushed.
    outbox: Sender<Bytes>,
    inbox: VecDeque<Bytes>,
    readable: bool,
    reader: JoinHandle<()>,
}

/// [`Transport`] over tokio TCP sockets.
///
/// Background tasks only forward what they see as [`Event`]s; all state
/// lives here and is touched from the task that owns the session.
pub struct TcpTransport {
    events: Sender<Event>,
    socket: Option<TcpSocket>,
    acceptor: Option<JoinHandle<()>>,
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
}

impl TcpTransport {
    pub(crate) fn new(events: Sender<Event>) -> Self {
        Self {
            events,
            socket: None,
            acceptor: None,
            connections: HashMap::new(),
            next_id: 0,
        }
    }

    /// Takes ownership of an accepted stream and starts reading frames from it.
    pub fn adopt(&mut self, stream: TcpStream, peer: SocketAddr) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay on {} failed: {}", peer, e);
        }
        let (reader, writer) = stream.into_split();
        let reader = tokio::spawn(read_frames(id, peer, reader, self.events.clone()));
        let (outbox, queued) = mpsc::channel(WRITE_QUEUE_LEN);
        tokio::spawn(write_payloads(peer, writer, queued));

        self.connections.insert(
            id,
            Connection {
                peer,
                outbox,
                inbox: VecDeque::new(),
                readable: false,
                reader,
            },
        );
        id
    }

    /// Queues frames read from `id`. Returns whether anyone wants to hear about them.
    pub fn deliver(&mut self, id: ConnectionId, frames: Vec<Bytes>) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.readable => {
                conn.inbox.extend(frames);
                true
            }
            _ => false,
        }
    }
}

impl Transport for TcpTransport {
    type Handle = ConnectionId;

    fn bind(&mut self, local: SocketAddr) -> io::Result<SocketAddr> {
        let socket = if local.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(local)?;
        let bound = socket.local_addr()?;
        self.socket = Some(socket);
        Ok(bound)
    }

    fn listen(&mut self) -> io::Result<()> {
        let socket = self
            .socket
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "socket is not bound"))?;
        let listener = socket.listen(LISTEN_BACKLOG)?;
        self.acceptor = Some(tokio::spawn(accept_loop(listener, self.events.clone())));
        Ok(())
    }

    fn stop_listening(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
            info!("stopped accepting connections");
        }
    }

    fn set_read_interest(&mut self, handle: ConnectionId, interested: bool) {
        if let Some(conn) = self.connections.get_mut(&handle) {
            conn.readable = interested;
            if !interested {
                conn.inbox.clear();
            }
        }
    }

    fn receive_next(&mut self, handle: ConnectionId) -> Option<Bytes> {
        self.connections.get_mut(&handle)?.inbox.pop_front()
    }

    fn send(&mut self, handle: ConnectionId, payload: &[u8]) -> io::Result<usize> {
        let conn = self
            .connections
            .get(&handle)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        match conn.outbox.try_send(Bytes::copy_from_slice(payload)) {
            Ok(()) => Ok(payload.len()),
            Err(TrySendError::Full(_)) => {
                warn!("write queue to {} is full", conn.peer);
                Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            Err(TrySendError::Closed(_)) => {
                error!("Failed to send data to {}: writer gone", conn.peer);
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            }
        }
    }

    fn close(&mut self, handle: ConnectionId) {
        if let Some(conn) = self.connections.remove(&handle) {
            conn.reader.abort();
            debug!("closed connection to {}", conn.peer);
        }
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.stop_listening();
        for (_, conn) in self.connections.drain() {
            conn.reader.abort();
        }
    }
}

async fn accept_loop(listener: TcpListener, events: Sender<Event>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if events.send(Event::Incoming(stream, peer)).await.is_err() {
                    warn!("Event channel closed");
                    break;
                }
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
                break;
            }
        }
    }
}

async fn write_payloads(peer: SocketAddr, mut writer: OwnedWriteHalf, mut queued: Receiver<Bytes>) {
    while let Some(payload) = queued.recv().await {
        if let Err(e) = writer.write_all(&payload).await {
            error!("Error writing to {}: {}", peer, e);
            return;
        }
    }
    // Queue closed: the connection was released, so finish the write side.
    if let Err(e) = writer.shutdown().await {
        debug!("shutdown of {} failed: {}", peer, e);
    }
}

async fn read_frames(
    id: ConnectionId,
    peer: SocketAddr,
    mut reader: OwnedReadHalf,
    events: Sender<Event>,
) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);

    loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                debug!("{} hung up", peer);
                break;
            }
            Ok(_) => {
                let mut frames = Vec::new();
                loop {
                    match decode_frame(&mut buf) {
                        Ok(Some(frame)) => frames.push(frame),
                        Ok(None) => break,
                        Err(e) => {
                            error!("Dropping {}: {}", peer, e);
                            let _ = events.send(Event::Hangup(id)).await;
                            return;
                        }
                    }
                }
                if !frames.is_empty() && events.send(Event::Frames(id, frames)).await.is_err() {
                    warn!("Event channel closed");
                    return;
                }
                if buf.capacity() == buf.len() {
                    buf.reserve(READ_BUFFER_SIZE);
                }
            }
            Err(e) => {
                error!("Error receiving data from {}: {}", peer, e);
                break;
            }
        }
    }
    let _ = events.send(Event::Hangup(id)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn adopted_pair(events: Sender<Event>) -> (TcpTransport, ConnectionId, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
        let (stream, peer) = accepted.unwrap();

        let mut transport = TcpTransport::new(events);
        let id = transport.adopt(stream, peer);
        (transport, id, client.unwrap())
    }

    async fn drain(mut client: TcpStream) -> Vec<u8> {
        let mut received = Vec::new();
        timeout(Duration::from_secs(10), client.read_to_end(&mut received))
            .await
            .expect("peer never saw end of stream")
            .unwrap();
        received
    }

    #[tokio::test]
    async fn send_right_after_adopt_is_delivered() {
        let (events, _rx) = mpsc::channel(16);
        let (mut transport, id, client) = adopted_pair(events).await;

        assert_eq!(transport.send(id, &[0u8; 100]).unwrap(), 100);
        transport.close(id);

        assert_eq!(drain(client).await, vec![0u8; 100]);
    }

    #[tokio::test]
    async fn stalled_peer_never_sees_partial_payloads() {
        const PAYLOAD: usize = 4096;
        let (events, _rx) = mpsc::channel(16);
        let (mut transport, id, client) = adopted_pair(events).await;

        // The peer is not reading yet, so the kernel buffers fill up and the
        // queue eventually rejects payloads.
        let mut accepted = 0usize;
        let mut rejected = false;
        for _ in 0..50_000 {
            match transport.send(id, &[7u8; PAYLOAD]) {
                Ok(n) => {
                    assert_eq!(n, PAYLOAD);
                    accepted += 1;
                }
                Err(e) => {
                    assert_eq!(e.kind(), io::ErrorKind::WouldBlock);
                    rejected = true;
                    break;
                }
            }
            tokio::task::yield_now().await;
        }
        assert!(accepted > 0);
        assert!(rejected, "write queue never filled");

        transport.close(id);
        let received = drain(client).await;
        assert_eq!(received.len(), accepted * PAYLOAD);
        assert!(received.iter().all(|&b| b == 7));
    }

    #[tokio::test]
    async fn send_to_unknown_connection_fails() {
        let (events, _rx) = mpsc::channel(16);
        let mut transport = TcpTransport::new(events);
        let err = transport.send(42, b"x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
