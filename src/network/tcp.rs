use std::{io, time::Duration};

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::net::TcpStream;
use tracing::instrument;

use crate::error::{Error, Result};

use super::{BrokerAddress, BrokerConnection};

/// Responses larger than this are treated as a corrupt size prefix.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct TcpConfig {
    /// How long DNS resolution plus the TCP handshake may take.
    pub connect_timeout: Duration,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// TCP connection to a single Kafka broker.
///
/// This is designed to be held by the [`ConnectionManager`], which keeps
/// one of these per broker and never lets two requests interleave on it.
///
/// [`ConnectionManager`]: super::manager::ConnectionManager
#[derive(Debug)]
pub struct TcpConnection {
    addr: BrokerAddress,
    stream: TcpStream,
}

impl TcpConnection {
    /// Connect to a broker.
    ///
    /// Every address the host resolves to is tried in turn. Failing to
    /// resolve, connect or finish within the configured timeout is
    /// reported as a `ConnectionError` for this broker.
    #[instrument(level = "debug")]
    pub async fn connect_to(config: &TcpConfig, addr: &BrokerAddress) -> Result<Self> {
        tracing::debug!("Connecting to {}", addr);
        let connect = TcpStream::connect((addr.host.as_str(), addr.port));
        let stream = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| {
                tracing::error!("ERROR: Connecting to {} timed out", addr);
                addr.connection_error(io::ErrorKind::TimedOut)
            })?
            .map_err(|err| {
                tracing::error!("ERROR: Could not connect to {} {:?}", addr, err);
                addr.connection_error(err.kind())
            })?;
        stream
            .set_nodelay(true)
            .map_err(|err| addr.connection_error(err.kind()))?;

        Ok(Self {
            addr: addr.clone(),
            stream,
        })
    }

    pub fn addr(&self) -> &BrokerAddress {
        &self.addr
    }

    fn io_error(&self, err: io::Error) -> Error {
        self.addr.connection_error(err.kind())
    }

    #[instrument(name = "network-read", level = "trace", skip(self, buf), fields(broker = %self.addr))]
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let size = buf.len();
        let mut index = 0_usize;
        while index < size {
            // Wait for the socket to be readable
            self.stream
                .readable()
                .await
                .map_err(|e| self.io_error(e))?;

            // Try to read data, this may still fail with `WouldBlock`
            // if the readiness event is a false positive.
            match self.stream.try_read(&mut buf[index..]) {
                Ok(0) => {
                    tracing::warn!("Broker {} closed the connection", self.addr);
                    return Err(self.addr.connection_error(io::ErrorKind::UnexpectedEof));
                }
                Ok(n) => {
                    index += n;
                    tracing::trace!("Read {} bytes, {} left", n, size - index);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::trace!("WouldBlock on read");
                    continue;
                }
                Err(e) => {
                    tracing::error!("ERROR: Reading on Socket {:?}", e);
                    return Err(self.io_error(e));
                }
            }
        }
        Ok(())
    }

    #[instrument(name = "network-write", level = "trace", skip(self, buf), fields(broker = %self.addr))]
    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let size = buf.len();
        let mut index = 0_usize;
        while index < size {
            // Wait for the socket to be writable
            self.stream
                .writable()
                .await
                .map_err(|e| self.io_error(e))?;

            // Partial writes are picked up on the next turn of the loop.
            match self.stream.try_write(&buf[index..]) {
                Ok(0) => {
                    return Err(self.addr.connection_error(io::ErrorKind::WriteZero));
                }
                Ok(n) => {
                    index += n;
                    tracing::trace!("Wrote {} bytes, {} left", n, size - index);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tracing::trace!("WouldBlock on write");
                    continue;
                }
                Err(e) => {
                    tracing::error!("ERROR: Writing to Socket {:?}", e);
                    return Err(self.io_error(e));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerConnection for TcpConnection {
    type ConnConfig = TcpConfig;

    async fn connect(config: &Self::ConnConfig, addr: &BrokerAddress) -> Result<Self> {
        Self::connect_to(config, addr).await
    }

    async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        tracing::trace!("Sending {} bytes to {}", frame.len(), self.addr);
        self.write_all(frame).await
    }

    /// Kafka queues up responses on the socket as requests are sent by
    /// the client. This pulls one response off the socket at a time.
    async fn receive_frame(&mut self) -> Result<Bytes> {
        let mut size = [0u8; 4];
        self.read_exact(&mut size).await?;

        let length = (&size[..]).get_i32();
        if length < 0 || length as usize > MAX_FRAME_SIZE {
            return Err(Error::protocol(format!(
                "response size {} from {} is out of range",
                length, self.addr
            )));
        }
        tracing::trace!("Reading {} bytes", length);

        let mut frame = BytesMut::zeroed(4 + length as usize);
        frame[..4].copy_from_slice(&size);
        self.read_exact(&mut frame[4..]).await?;
        Ok(frame.freeze())
    }
}
