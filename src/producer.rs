//! Client that sends records to a cluster.

use bytes::Bytes;
use tracing::instrument;

use crate::{
    client::Client,
    error::{Error, KafkaCode, Result},
    metadata::TopicMetadata,
    network::{tcp::TcpConnection, BrokerAddress, BrokerConnection},
    partitioner::Partitioner,
    protocol::{produce, Header, ProduceRequest, ProduceResponse, API_KEY_PRODUCE},
};

/// A message to produce: the payload plus an optional key and headers.
///
/// Anything byte-like converts into an unkeyed message:
/// ```rust
/// use libkafka::prelude::ProduceMessage;
///
/// let message = ProduceMessage::from("abc").key("user-42");
/// assert_eq!(&message.value[..], b"abc");
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProduceMessage {
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<Header>,
}

impl ProduceMessage {
    pub fn new(value: impl Into<Bytes>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn key(mut self, key: impl Into<Bytes>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn header(mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        self.headers.push(Header {
            key: key.into(),
            value: Some(value.into()),
        });
        self
    }
}

impl From<Bytes> for ProduceMessage {
    fn from(value: Bytes) -> Self {
        Self::new(value)
    }
}

impl From<Vec<u8>> for ProduceMessage {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for ProduceMessage {
    fn from(value: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(value))
    }
}

impl From<String> for ProduceMessage {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for ProduceMessage {
    fn from(value: &str) -> Self {
        Self::new(Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// Messages of one call bound for the same leader, with their partition.
type Route<'m> = (BrokerAddress, Vec<(i32, &'m ProduceMessage)>);

/// Produces to one topic.
///
/// Every call is sent right away and acknowledged before it returns, there
/// is no background queue. Unkeyed messages go to partition 0 (see
/// [`Partitioner`]), so messages of consecutive calls are stored in call
/// order. Create one with [`Client::producer`] or
/// [`ProducerBuilder`](crate::producer_builder::ProducerBuilder).
#[derive(Debug)]
pub struct Producer<T: BrokerConnection = TcpConnection> {
    pub(crate) client: Client<T>,
    pub(crate) topic: String,
    pub(crate) partitioner: Partitioner,
    pub(crate) required_acks: i16,
    pub(crate) timeout_ms: i32,
}

impl<T: BrokerConnection> Producer<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    /// Produce one message and wait for the broker to acknowledge it.
    pub async fn produce(&self, message: impl Into<ProduceMessage>) -> Result<()> {
        self.produce_batch(&[message.into()]).await
    }

    /// Produce several messages in as few requests as possible, one per
    /// leader broker. Messages for the same partition keep their order.
    ///
    /// When a leader answers that its leadership is stale, the topic's
    /// metadata is refreshed and that leader's share is sent once more.
    #[instrument(name = "produce", level = "debug", skip(self, messages), fields(topic = %self.topic, count = messages.len()))]
    pub async fn produce_batch(&self, messages: &[ProduceMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let metadata = self.client.resolve(&self.topic).await?;

        for (leader, batch) in self.route(&metadata, messages.iter())? {
            match self.send(&leader, &batch).await {
                Err(err) if err.is_stale_metadata() => {
                    tracing::warn!("{} from {}, refreshing metadata and retrying", err, leader);
                    self.client.invalidate(&self.topic).await;
                    let metadata = self.client.resolve(&self.topic).await?;
                    let retry = batch.iter().map(|(_, message)| *message);
                    for (leader, batch) in self.route(&metadata, retry)? {
                        self.send(&leader, &batch).await?;
                    }
                }
                other => other?,
            }
        }
        Ok(())
    }

    fn route<'m>(
        &self,
        metadata: &TopicMetadata,
        messages: impl Iterator<Item = &'m ProduceMessage>,
    ) -> Result<Vec<Route<'m>>> {
        let mut routes: Vec<Route<'m>> = vec![];
        for message in messages {
            let partition = self
                .partitioner
                .partition(message.key.as_deref(), metadata.partition_count());
            let leader = metadata
                .leader(partition)
                .ok_or_else(|| Error::NoLeaderForTopicPartition(self.topic.clone(), partition))?;
            match routes.iter_mut().find(|(addr, _)| addr == leader) {
                Some((_, batch)) => batch.push((partition, message)),
                None => routes.push((leader.clone(), vec![(partition, message)])),
            }
        }
        Ok(routes)
    }

    async fn send(&self, leader: &BrokerAddress, batch: &[(i32, &ProduceMessage)]) -> Result<()> {
        let correlation_id = self.client.next_correlation_id();
        let mut request = ProduceRequest::new(
            self.required_acks,
            self.timeout_ms,
            correlation_id,
            self.client.client_id(),
        );
        for (partition, message) in batch {
            request.add(
                &self.topic,
                *partition,
                message.key.clone(),
                Some(message.value.clone()),
                message.headers.clone(),
            );
        }
        tracing::debug!("Producing {} records to {}", request.record_count(), leader);

        if self.required_acks == 0 {
            return self.client.send_only(leader, &request).await;
        }
        let response: ProduceResponse = self.client.request(leader, correlation_id, &request).await?;
        for (_, partition) in response.partitions() {
            match partition.error_code {
                KafkaCode::None => tracing::trace!(
                    "{}/{} stored at base offset {}",
                    self.topic,
                    partition.index,
                    partition.base_offset
                ),
                KafkaCode::UnsupportedVersion => {
                    return Err(Error::UnsupportedVersion {
                        api_key: API_KEY_PRODUCE,
                        version: produce::request::API_VERSION,
                    })
                }
                code => {
                    tracing::error!("ERROR: Produce to {}/{} answered {:?}", self.topic, partition.index, code);
                    return Err(Error::ProduceError {
                        topic: self.topic.clone(),
                        partition: partition.index,
                        code,
                    });
                }
            }
        }

        // every partition written to must be acknowledged
        let answered: Vec<i32> = response
            .partitions()
            .filter(|(topic, _)| topic[..] == *self.topic.as_bytes())
            .map(|(_, partition)| partition.index)
            .collect();
        if let Some((missing, _)) = batch.iter().find(|(partition, _)| !answered.contains(partition)) {
            return Err(Error::protocol(format!(
                "produce response without {}/{}",
                self.topic, missing
            )));
        }
        Ok(())
    }
}
