//! One connection per broker, shared by everything in a client.
//!
//! Each broker gets a slot holding at most one live connection. A caller
//! locks the slot for the whole request/response exchange, so requests to
//! one broker are served strictly one after the other while different
//! brokers proceed independently.
use std::{
    collections::HashMap,
    io::ErrorKind,
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::{
    encode::ToByte,
    error::{Error, Result},
    protocol,
};

use super::{tcp::TcpConnection, BrokerAddress, BrokerConnection};

type Slot<T> = Arc<Mutex<Option<T>>>;

pub struct ConnectionManager<T: BrokerConnection = TcpConnection> {
    config: T::ConnConfig,
    request_timeout: Duration,
    connections: Mutex<HashMap<BrokerAddress, Slot<T>>>,
    connects: AtomicUsize,
    correlation_id: AtomicI32,
}

impl<T: BrokerConnection> std::fmt::Debug for ConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("request_timeout", &self.request_timeout)
            .field("connects", &self.connects.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: BrokerConnection> ConnectionManager<T> {
    pub fn new(config: T::ConnConfig, request_timeout: Duration) -> Self {
        Self {
            config,
            request_timeout,
            connections: Mutex::new(HashMap::new()),
            connects: AtomicUsize::new(0),
            correlation_id: AtomicI32::new(0),
        }
    }

    /// Correlation ids are unique per manager, so per client.
    pub fn next_correlation_id(&self) -> i32 {
        self.correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn slot(&self, addr: &BrokerAddress) -> Slot<T> {
        let mut connections = self.connections.lock().await;
        connections
            .entry(addr.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn open(&self, addr: &BrokerAddress) -> Result<T> {
        let conn = T::connect(&self.config, addr).await?;
        self.connects.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Connected to {}", addr);
        Ok(conn)
    }

    /// Send one request frame to `addr` and wait for its response body.
    ///
    /// The connection is opened on first use. When an established
    /// connection turns out to be reset it is reopened and the exchange
    /// tried once more, any other failure is returned as is. A failed
    /// exchange always discards the connection, the next call starts on
    /// a fresh one.
    #[instrument(level = "debug", skip(self, frame), fields(broker = %addr, bytes = frame.len()))]
    pub async fn send(&self, addr: &BrokerAddress, frame: &[u8]) -> Result<Bytes> {
        let slot = self.slot(addr).await;
        let mut guard = slot.lock().await;

        let mut reconnected = false;
        loop {
            let mut conn = match guard.take() {
                Some(conn) => conn,
                None => self.open(addr).await?,
            };
            match self.exchange(&mut conn, addr, frame).await {
                Ok(body) => {
                    *guard = Some(conn);
                    return Ok(body);
                }
                Err(err) if err.is_connection_reset() && !reconnected => {
                    tracing::warn!("Connection to {} was reset, reconnecting", addr);
                    reconnected = true;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Encode `req`, exchange it with `addr` and parse the typed answer.
    pub async fn request<Q, R>(&self, addr: &BrokerAddress, correlation_id: i32, req: &Q) -> Result<R>
    where
        Q: ToByte + Sync + ?Sized,
        R: TryFrom<Bytes, Error = Error>,
    {
        let frame = protocol::encode_frame(req)?;
        let body = self.send(addr, &frame).await?;
        protocol::decode(body, correlation_id)
    }

    /// Send a frame the broker will not answer (produce with acks 0).
    #[instrument(level = "debug", skip(self, frame), fields(broker = %addr, bytes = frame.len()))]
    pub async fn send_only(&self, addr: &BrokerAddress, frame: &[u8]) -> Result<()> {
        let slot = self.slot(addr).await;
        let mut guard = slot.lock().await;

        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => self.open(addr).await?,
        };
        tokio::time::timeout(self.request_timeout, conn.send_frame(frame))
            .await
            .map_err(|_| addr.connection_error(ErrorKind::TimedOut))??;
        *guard = Some(conn);
        Ok(())
    }

    async fn exchange(&self, conn: &mut T, addr: &BrokerAddress, frame: &[u8]) -> Result<Bytes> {
        let round_trip = async {
            conn.send_frame(frame).await?;
            conn.receive_response().await
        };
        tokio::time::timeout(self.request_timeout, round_trip)
            .await
            .map_err(|_| {
                tracing::error!(
                    "ERROR: No response from {} within {:?}",
                    addr,
                    self.request_timeout
                );
                addr.connection_error(ErrorKind::TimedOut)
            })?
    }

    /// Drop every connection. Exchanges already running finish on the
    /// connection they hold, later calls reconnect.
    pub async fn close(&self) {
        let mut connections = self.connections.lock().await;
        tracing::debug!("Closing {} broker connections", connections.len());
        connections.clear();
    }

    /// Number of brokers with a live connection.
    pub async fn connection_count(&self) -> usize {
        let slots: Vec<Slot<T>> = self.connections.lock().await.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Connections opened over the manager's lifetime, reconnects included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}
