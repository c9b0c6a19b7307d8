use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use log::{debug, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::packet::{encode_frame, payload, SeqTsHeader};
use crate::time::Timestamp;

/// Sends sequence-numbered, timestamped messages to a `lossmon` endpoint.
pub struct SequenceSender {
    stream: TcpStream,
    payload_size: usize,
    peer_addr: SocketAddr,
    buf: BytesMut,
}

impl SequenceSender {
    /// # Arguments
    /// * `addr` - Endpoint to connect to
    /// * `payload_size` - Bytes per message, padded up to the header size if smaller
    pub async fn connect<A>(addr: A, payload_size: usize) -> io::Result<Self>
    where
        A: ToSocketAddrs,
    {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        info!("Connected to {} and my addr is {}", peer_addr, stream.local_addr()?);
        Ok(Self {
            stream,
            payload_size,
            peer_addr,
            buf: BytesMut::new(),
        })
    }

    /// Sends `seq` stamped with the current time.
    pub async fn send(&mut self, seq: u32) -> io::Result<()> {
        let payload = payload(SeqTsHeader::new(seq, Timestamp::now()), self.payload_size);
        self.send_raw(&payload).await?;
        debug!("sent seq {} to {}", seq, self.peer_addr);
        Ok(())
    }

    /// Frames and sends an arbitrary payload, header or not.
    pub async fn send_raw(&mut self, payload: &[u8]) -> io::Result<()> {
        self.buf.clear();
        encode_frame(payload, &mut self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.stream.write_all(&self.buf).await
    }

    /// Waits for one reply of `buf.len()` bytes.
    pub async fn read_reply(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read_exact(buf).await
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn shutdown(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}
