//! The engine shared by producers and consumers.
//!
//! A [`Client`] owns the connection manager and the metadata cache. It is
//! cheap to clone, every clone talks through the same connections, so a
//! producer and a consumer built from one client share one socket per
//! broker.
//!
//! ### Example
//! ```rust,no_run
//! use libkafka::prelude::*;
//!
//! # async fn run() -> Result<()> {
//! let client = Client::new(ClientConfig::new("localhost:9092")?);
//!
//! let producer = client.producer("purchases").build().await?;
//! producer.produce("abc").await?;
//!
//! let mut consumer = client.consumer("purchases").build().await?;
//! let message = consumer.consume().await?;
//! assert_eq!(&message.value[..], b"abc");
//!
//! client.close().await;
//! # Ok(())
//! # }
//! ```
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::{
    config::ClientConfig,
    consumer_builder::ConsumerBuilder,
    encode::ToByte,
    error::{Error, KafkaCode, Result},
    metadata::{MetadataCache, TopicMetadata},
    network::{manager::ConnectionManager, tcp::TcpConnection, BrokerAddress, BrokerConnection},
    producer_builder::ProducerBuilder,
    protocol::{ApiVersionsRequest, ApiVersionsResponse, ListOffsetsRequest, ListOffsetsResponse, SUPPORTED_VERSIONS},
};

pub struct Client<T: BrokerConnection = TcpConnection> {
    config: Arc<ClientConfig>,
    connections: Arc<ConnectionManager<T>>,
    metadata: Arc<MetadataCache<T>>,
    versions_checked: Arc<OnceCell<()>>,
}

impl<T: BrokerConnection> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            connections: self.connections.clone(),
            metadata: self.metadata.clone(),
            versions_checked: self.versions_checked.clone(),
        }
    }
}

impl<T: BrokerConnection> std::fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("connections", &self.connections)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl Client<TcpConnection> {
    /// A client over plain TCP. Nothing is connected until first use.
    pub fn new(config: ClientConfig) -> Self {
        let tcp = config.tcp_config();
        Self::with_connection_config(tcp, config)
    }

    /// A client that has already checked the first bootstrap broker
    /// that answers speaks the needed API versions.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let client = Self::new(config);
        client.ensure_api_versions().await?;
        Ok(client)
    }
}

impl<T: BrokerConnection> Client<T> {
    pub fn with_connection_config(conn_config: T::ConnConfig, config: ClientConfig) -> Self {
        tracing::debug!(
            "Client {} for cluster at {:?}",
            config.client_id,
            config.bootstrap
        );
        let connections = Arc::new(ConnectionManager::new(conn_config, config.request_timeout));
        let metadata = Arc::new(MetadataCache::new(&config, connections.clone()));
        Self {
            config: Arc::new(config),
            connections,
            metadata,
            versions_checked: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    pub fn metadata(&self) -> &MetadataCache<T> {
        &self.metadata
    }

    pub fn connections(&self) -> &ConnectionManager<T> {
        &self.connections
    }

    /// Start configuring a producer for `topic`.
    pub fn producer(&self, topic: impl Into<String>) -> ProducerBuilder<T> {
        ProducerBuilder::new(self.clone(), topic)
    }

    /// Start configuring a consumer for `topic`.
    pub fn consumer(&self, topic: impl Into<String>) -> ConsumerBuilder<T> {
        ConsumerBuilder::new(self.clone(), topic)
    }

    /// Leaders of every partition of `topic`.
    pub async fn resolve(&self, topic: &str) -> Result<Arc<TopicMetadata>> {
        self.ensure_api_versions().await?;
        self.metadata.resolve(topic).await
    }

    pub async fn invalidate(&self, topic: &str) {
        self.metadata.invalidate(topic).await
    }

    pub fn next_correlation_id(&self) -> i32 {
        self.connections.next_correlation_id()
    }

    /// Send `req` to `addr` and parse the answer.
    pub async fn request<Q, R>(&self, addr: &BrokerAddress, correlation_id: i32, req: &Q) -> Result<R>
    where
        Q: ToByte + Sync + ?Sized,
        R: TryFrom<Bytes, Error = Error>,
    {
        self.connections.request(addr, correlation_id, req).await
    }

    /// Send `req` to `addr` without waiting for an answer.
    pub async fn send_only<Q>(&self, addr: &BrokerAddress, req: &Q) -> Result<()>
    where
        Q: ToByte + Sync + ?Sized,
    {
        let frame = crate::protocol::encode_frame(req)?;
        self.connections.send_only(addr, &frame).await
    }

    /// Offset of `partition` at `timestamp`, or at one of
    /// [`EARLIEST_TIMESTAMP`](crate::protocol::list_offsets::request::EARLIEST_TIMESTAMP)
    /// and [`LATEST_TIMESTAMP`](crate::protocol::list_offsets::request::LATEST_TIMESTAMP).
    ///
    /// The broker's error code is returned as `KafkaError` so callers can
    /// decide whether the metadata is stale.
    #[instrument(level = "debug", skip(self))]
    pub async fn list_offset(&self, topic: &str, partition: i32, timestamp: i64) -> Result<i64> {
        let leader = self
            .resolve(topic)
            .await?
            .leader(partition)
            .cloned()
            .ok_or_else(|| Error::NoLeaderForTopicPartition(topic.to_owned(), partition))?;

        let correlation_id = self.next_correlation_id();
        let mut request = ListOffsetsRequest::new(correlation_id, self.client_id());
        request.add(topic, partition, timestamp);
        let response: ListOffsetsResponse = self.request(&leader, correlation_id, &request).await?;

        let answer = response
            .partition(topic, partition)
            .ok_or_else(|| Error::protocol(format!("no offset for {}/{} in response", topic, partition)))?;
        match answer.error_code {
            KafkaCode::None => Ok(answer.offset),
            code => {
                tracing::warn!("ListOffsets for {}/{} answered {:?}", topic, partition, code);
                Err(Error::KafkaError(code))
            }
        }
    }

    /// Check once per client that the cluster serves every API version
    /// this client sends.
    pub async fn ensure_api_versions(&self) -> Result<()> {
        if !self.config.verify_api_versions {
            return Ok(());
        }
        self.versions_checked
            .get_or_try_init(|| self.check_api_versions())
            .await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn check_api_versions(&self) -> Result<()> {
        let mut last_error = None;
        for addr in self.config.bootstrap.iter() {
            let correlation_id = self.next_correlation_id();
            let request = ApiVersionsRequest::new(correlation_id, self.client_id());
            match self
                .request::<_, ApiVersionsResponse>(addr, correlation_id, &request)
                .await
            {
                Ok(versions) => {
                    versions.check(&SUPPORTED_VERSIONS)?;
                    tracing::debug!("Broker {} supports every API version in use", addr);
                    return Ok(());
                }
                Err(err @ Error::ConnectionError { .. }) => {
                    tracing::warn!("Bootstrap broker {} unavailable {:?}", addr, err);
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_error
            .unwrap_or_else(|| Error::InvalidConfig("no bootstrap brokers configured".to_owned())))
    }

    /// Drop every broker connection. The client stays usable, the next
    /// request reconnects.
    pub async fn close(&self) {
        self.connections.close().await
    }
}
