//! Connection & communication with a broker.
//!
//! # Network Module
//!
//! Kafka uses a binary protocol over TCP. The protocol defines all APIs as
//! request response message pairs. All messages are size delimited.
//!
//! The client initiates a socket connection and then writes a sequence of
//! request messages and reads back the corresponding response message. No
//! handshake is required on connection or disconnection.
//!
//! The server guarantees that on a single TCP connection, requests will
//! be processed in the order they are sent and responses will return in
//! that order as well. This client keeps a single request in flight per
//! connection, see [`manager::ConnectionManager`], which holds one
//! connection per broker and serializes the exchanges on it.
//!
//! The server has a configurable maximum limit on request size and any
//! request that exceeds this limit will result in the socket being
//! disconnected.
use std::{fmt, fmt::Debug, io::ErrorKind, str::FromStr};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    encode::ToByte,
    error::{Error, Result},
    protocol,
};

pub mod manager;
pub mod tcp;

/// Host and port of a broker, written `host:port`.
///
/// ### Example
/// ```rust
/// use libkafka::prelude::BrokerAddress;
///
/// let addr: BrokerAddress = "localhost:9092".parse().unwrap();
/// assert_eq!(addr.port, 9092);
/// assert_eq!(addr.to_string(), "localhost:9092");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub(crate) fn connection_error(&self, kind: ErrorKind) -> Error {
        Error::ConnectionError {
            broker: self.to_string(),
            kind,
        }
    }
}

impl FromStr for BrokerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidBrokerAddress(s.to_owned());
        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        // bracketed ipv6 literals, [::1]:9092
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse a comma separated broker list, `host:port,host:port`.
pub fn parse_broker_list(list: &str) -> Result<Vec<BrokerAddress>> {
    let brokers = list
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<BrokerAddress>)
        .collect::<Result<Vec<BrokerAddress>>>()?;
    if brokers.is_empty() {
        return Err(Error::InvalidBrokerAddress(list.to_owned()));
    }
    Ok(brokers)
}

/// A live, framed byte stream to one broker.
///
/// Implementations deliver whole frames: `send_frame` writes every byte
/// it is given, `receive_frame` returns exactly one size delimited
/// response including its size prefix.
#[async_trait]
pub trait BrokerConnection: Send + Sized {
    type ConnConfig: Clone + Debug + Send + Sync;

    async fn connect(config: &Self::ConnConfig, addr: &BrokerAddress) -> Result<Self>;

    async fn send_frame(&mut self, frame: &[u8]) -> Result<()>;

    async fn receive_frame(&mut self) -> Result<Bytes>;

    /// Serialize a request and send it as one frame.
    async fn send_request<R: ToByte + Sync + Send>(&mut self, req: &R) -> Result<()> {
        let frame = protocol::encode_frame(req)?;
        self.send_frame(&frame).await
    }

    /// Receive one response and strip its size prefix.
    async fn receive_response(&mut self) -> Result<Bytes> {
        let frame = self.receive_frame().await?;
        protocol::decode_frame(frame)
    }
}
