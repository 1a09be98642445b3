use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use crate::{
    client::Client,
    config::{duration_ms, OffsetPolicy},
    consumer::{Consumer, Cursor},
    error::{Error, Result},
    network::{tcp::TcpConnection, BrokerConnection},
};

/// Configure a [`Consumer`].
///
/// Fetch sizes, wait time and offset policy start from the client's
/// [`ClientConfig`](crate::config::ClientConfig).
///
/// ### Example
/// ```rust,no_run
/// use std::time::Duration;
///
/// use libkafka::prelude::*;
///
/// # async fn run() -> Result<()> {
/// let client = Client::new(ClientConfig::new("localhost:9092")?);
/// let mut consumer = client
///     .consumer("purchases")
///     .partitions(vec![0, 1])
///     .offset_policy(OffsetPolicy::Latest)
///     .poll_timeout(Duration::from_secs(2))
///     .build()
///     .await?;
///
/// let message = consumer.consume().await?;
/// # Ok(())
/// # }
/// ```
pub struct ConsumerBuilder<T: BrokerConnection = TcpConnection> {
    client: Client<T>,
    topic: String,
    partitions: Option<Vec<i32>>,
    offsets: BTreeMap<i32, i64>,
    offset_policy: OffsetPolicy,
    max_wait: Duration,
    min_bytes: i32,
    max_bytes: i32,
    partition_max_bytes: i32,
    poll_timeout: Option<Duration>,
}

impl<T: BrokerConnection> ConsumerBuilder<T> {
    /// Start a consumer builder. To complete, use the [`build`](Self::build) method.
    pub fn new(client: Client<T>, topic: impl Into<String>) -> Self {
        let config = client.config();
        Self {
            topic: topic.into(),
            partitions: None,
            offsets: BTreeMap::new(),
            offset_policy: config.offset_policy,
            max_wait: config.fetch_max_wait,
            min_bytes: config.fetch_min_bytes,
            max_bytes: config.fetch_max_bytes,
            partition_max_bytes: config.partition_max_bytes,
            poll_timeout: None,
            client,
        }
    }

    /// Read only these partitions instead of all of them.
    pub fn partitions(mut self, partitions: Vec<i32>) -> Self {
        self.partitions = Some(partitions);
        self
    }

    /// Start `partition` at `offset` instead of where the offset policy
    /// would.
    pub fn seek(mut self, partition: i32, offset: i64) -> Self {
        self.offsets.insert(partition, offset);
        self
    }

    pub fn offset_policy(mut self, policy: OffsetPolicy) -> Self {
        self.offset_policy = policy;
        self
    }

    /// The maximum time the broker may wait for data on a fetch.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// The minimum bytes to accumulate in the response.
    pub fn min_bytes(mut self, min_bytes: i32) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    /// The maximum bytes to fetch.
    pub fn max_bytes(mut self, max_bytes: i32) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// The maximum bytes to fetch from a single partition.
    pub fn partition_max_bytes(mut self, max_bytes: i32) -> Self {
        self.partition_max_bytes = max_bytes;
        self
    }

    /// Keep fetching for up to `timeout` before `consume` gives up with
    /// `NoMessageAvailable`. Without it a single round of fetches is made.
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = Some(timeout);
        self
    }

    /// Resolve the topic and pick the starting offset of every partition.
    pub async fn build(self) -> Result<Consumer<T>> {
        let metadata = self.client.resolve(&self.topic).await?;
        let mut partitions = match self.partitions {
            Some(partitions) => {
                if let Some(missing) = partitions.iter().find(|p| metadata.leader(**p).is_none()) {
                    return Err(Error::InvalidConfig(format!(
                        "{} has no partition {}",
                        self.topic, missing
                    )));
                }
                partitions
            }
            None => metadata.partitions.iter().map(|p| p.partition).collect(),
        };
        partitions.sort_unstable();
        partitions.dedup();
        if partitions.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "no partitions of {} to consume",
                self.topic
            )));
        }

        let mut cursors = BTreeMap::new();
        for partition in partitions.iter() {
            let cursor = match self.offsets.get(partition) {
                Some(offset) => Cursor::Active(*offset),
                None => Cursor::Uninitialized,
            };
            cursors.insert(*partition, cursor);
        }

        let max_wait_ms = duration_ms(self.max_wait);
        let mut consumer = Consumer {
            client: self.client,
            topic: self.topic,
            partitions,
            cursors,
            current: 0,
            buffer: VecDeque::new(),
            offset_policy: self.offset_policy,
            max_wait_ms,
            min_bytes: self.min_bytes,
            max_bytes: self.max_bytes,
            partition_max_bytes: self.partition_max_bytes,
            poll_timeout: self.poll_timeout,
        };

        for partition in consumer.partitions.clone() {
            consumer.start_offset(partition).await?;
        }
        tracing::debug!("Consumer for {} at {:?}", consumer.topic, consumer.cursors);
        Ok(consumer)
    }
}
