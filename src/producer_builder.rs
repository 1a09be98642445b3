use crate::{
    client::Client,
    error::{Error, Result},
    network::{tcp::TcpConnection, BrokerConnection},
    partitioner::Partitioner,
    producer::Producer,
};

/// Configure a [`Producer`].
///
/// Acks and timeout start from the client's [`ClientConfig`](crate::config::ClientConfig).
///
/// ### Example
/// ```rust,no_run
/// use libkafka::prelude::*;
///
/// # async fn run() -> Result<()> {
/// let client = Client::new(ClientConfig::new("localhost:9092")?);
/// let producer = client
///     .producer("purchases")
///     .partitioner(Partitioner::Fixed(1))
///     .required_acks(-1)
///     .build()
///     .await?;
///
/// producer.produce(ProduceMessage::from("abc").key("user-42")).await?;
/// # Ok(())
/// # }
/// ```
pub struct ProducerBuilder<T: BrokerConnection = TcpConnection> {
    client: Client<T>,
    topic: String,
    partitioner: Partitioner,
    required_acks: i16,
    timeout_ms: i32,
}

impl<T: BrokerConnection> ProducerBuilder<T> {
    /// Start a producer builder. To complete, use the [`build`](Self::build) method.
    pub fn new(client: Client<T>, topic: impl Into<String>) -> Self {
        let required_acks = client.config().required_acks;
        let timeout_ms = client.config().produce_timeout_ms;
        Self {
            client,
            topic: topic.into(),
            partitioner: Partitioner::default(),
            required_acks,
            timeout_ms,
        }
    }

    pub fn partitioner(mut self, partitioner: Partitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    /// The number of acknowledgments the producer requires the leader to have received before considering a request complete. Allowed values: 0 for no acknowledgments, 1 for only the leader and -1 for the full ISR.
    pub fn required_acks(mut self, required_acks: i16) -> Self {
        self.required_acks = required_acks;
        self
    }

    /// The time the broker may take to gather the acknowledgments.
    pub fn timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Resolve the topic's leaders and hand out the producer.
    ///
    /// Fails with `UnknownTopic` when the cluster does not know the topic
    /// and does not create it on demand.
    pub async fn build(self) -> Result<Producer<T>> {
        if !matches!(self.required_acks, -1..=1) {
            return Err(Error::InvalidConfig(format!(
                "required acks must be -1, 0 or 1, not {}",
                self.required_acks
            )));
        }
        let metadata = self.client.resolve(&self.topic).await?;
        if let Partitioner::Fixed(partition) = self.partitioner {
            if metadata.leader(partition).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "{} has no partition {}",
                    self.topic, partition
                )));
            }
        }
        tracing::debug!("Producer for {} over {} partitions", self.topic, metadata.partition_count());

        Ok(Producer {
            client: self.client,
            topic: self.topic,
            partitioner: self.partitioner,
            required_acks: self.required_acks,
            timeout_ms: self.timeout_ms,
        })
    }
}
