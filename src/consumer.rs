//! Client that consumes records from a cluster.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use bytes::Bytes;
use tokio::time::Instant;
use tokio_stream::Stream;
use tracing::instrument;

use crate::{
    client::Client,
    config::OffsetPolicy,
    error::{Error, KafkaCode, Result},
    network::{tcp::TcpConnection, BrokerConnection},
    protocol::{
        fetch,
        list_offsets::request::{EARLIEST_TIMESTAMP, LATEST_TIMESTAMP},
        FetchRequest, FetchResponse, Header, API_KEY_FETCH,
    },
};

/// Pause between empty fetches while polling.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Common consumed message format.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumeMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: i64,
    pub key: Option<Bytes>,
    pub value: Bytes,
    pub headers: Vec<Header>,
}

/// Read position of one partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Cursor {
    /// No offset chosen yet, the offset policy picks one on first fetch.
    Uninitialized,
    /// Offset of the next record to hand out.
    Active(i64),
}

/// Reads one topic back, one message per call, in offset order.
///
/// Each consumer keeps its own offsets. Two consumers of the same topic
/// never influence each other, both start from the offset policy and
/// advance independently. Partitions are read in index order: records
/// of the partition being read are drained first and the consumer moves
/// on to the next partition only once it has nothing more.
///
/// ### Example
/// ```rust,no_run
/// use libkafka::prelude::*;
///
/// # async fn run() -> Result<()> {
/// let client = Client::new(ClientConfig::new("localhost:9092")?);
/// let mut consumer = client.consumer("purchases").build().await?;
///
/// loop {
///     match consumer.consume().await {
///         Ok(message) => println!("{:?}", message.value),
///         Err(Error::NoMessageAvailable { .. }) => break,
///         Err(err) => return Err(err),
///     }
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Consumer<T: BrokerConnection = TcpConnection> {
    pub(crate) client: Client<T>,
    pub(crate) topic: String,
    /// Assigned partitions in index order.
    pub(crate) partitions: Vec<i32>,
    pub(crate) cursors: BTreeMap<i32, Cursor>,
    /// Index into `partitions` of the partition being read.
    pub(crate) current: usize,
    pub(crate) buffer: VecDeque<ConsumeMessage>,
    pub(crate) offset_policy: OffsetPolicy,
    pub(crate) max_wait_ms: i32,
    pub(crate) min_bytes: i32,
    pub(crate) max_bytes: i32,
    pub(crate) partition_max_bytes: i32,
    pub(crate) poll_timeout: Option<Duration>,
}

impl<T: BrokerConnection> Consumer<T> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partitions(&self) -> &[i32] {
        &self.partitions
    }

    pub fn client(&self) -> &Client<T> {
        &self.client
    }

    /// The next unread message.
    ///
    /// Without a poll timeout every assigned partition is fetched at most
    /// once and `NoMessageAvailable` is returned when none has data. With
    /// one, empty fetches are repeated until the timeout runs out.
    pub async fn consume(&mut self) -> Result<ConsumeMessage> {
        let deadline = self.poll_timeout.map(|timeout| Instant::now() + timeout);
        loop {
            if let Some(message) = self.next_buffered() {
                return Ok(message);
            }
            self.fill().await?;
            if !self.buffer.is_empty() {
                continue;
            }
            match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                _ => {
                    return Err(Error::NoMessageAvailable {
                        topic: self.topic.clone(),
                    })
                }
            }
        }
    }

    /// Offset of the next message `partition` will hand out, `None`
    /// until the consumer has picked a starting offset for it.
    pub fn position(&self, partition: i32) -> Result<Option<i64>> {
        match self.cursor(partition)? {
            Cursor::Uninitialized => Ok(None),
            Cursor::Active(offset) => Ok(Some(offset)),
        }
    }

    /// Skip ahead to `offset` on `partition`. Moving backwards is refused,
    /// a consumer never hands out a message twice.
    pub fn seek(&mut self, partition: i32, offset: i64) -> Result<()> {
        if let Cursor::Active(current) = self.cursor(partition)? {
            if offset < current {
                return Err(Error::InvalidSeek {
                    partition,
                    current,
                    requested: offset,
                });
            }
        }
        tracing::debug!("Seeking {}/{} to {}", self.topic, partition, offset);
        self.buffer.retain(|message| message.partition != partition);
        self.cursors.insert(partition, Cursor::Active(offset));
        Ok(())
    }

    /// Convert consumer into an asynchronous iterator.
    ///
    /// The stream waits for new messages instead of ending, errors other
    /// than an empty fetch are handed to the caller.
    #[must_use = "stream does nothing by itself"]
    pub fn into_stream(mut self) -> impl Stream<Item = Result<ConsumeMessage>> {
        async_stream::stream! {
            loop {
                match self.consume().await {
                    Err(Error::NoMessageAvailable { .. }) => {
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    other => yield other,
                }
            }
        }
    }

    fn cursor(&self, partition: i32) -> Result<Cursor> {
        self.cursors
            .get(&partition)
            .copied()
            .ok_or_else(|| Error::UnassignedPartition {
                topic: self.topic.clone(),
                partition,
            })
    }

    fn next_buffered(&mut self) -> Option<ConsumeMessage> {
        let message = self.buffer.pop_front()?;
        self.cursors
            .insert(message.partition, Cursor::Active(message.offset + 1));
        Some(message)
    }

    /// Fetch partitions in index order, starting with the current one,
    /// until one returns records.
    async fn fill(&mut self) -> Result<()> {
        for _ in 0..self.partitions.len() {
            let partition = self.partitions[self.current];
            if self.fetch_partition(partition).await? > 0 {
                return Ok(());
            }
            self.current = (self.current + 1) % self.partitions.len();
        }
        Ok(())
    }

    /// One fetch with the single retry: after a leadership error the
    /// metadata is refreshed, after an out of range error the offset is
    /// moved to the start of the log when records were deleted under it.
    #[instrument(level = "debug", skip(self), fields(topic = %self.topic))]
    async fn fetch_partition(&mut self, partition: i32) -> Result<usize> {
        match self.try_fetch(partition).await {
            Err(err) if err.is_stale_metadata() => {
                tracing::warn!("{}, refreshing metadata and retrying", err);
                self.client.invalidate(&self.topic).await;
                self.try_fetch(partition).await
            }
            Err(err) if err.code() == Some(KafkaCode::OffsetOutOfRange) => {
                let current = self.cursor(partition)?;
                let earliest = self
                    .client
                    .list_offset(&self.topic, partition, EARLIEST_TIMESTAMP)
                    .await?;
                match current {
                    Cursor::Active(offset) if earliest > offset => {
                        tracing::warn!(
                            "Offset {} of {}/{} was deleted, moving to {}",
                            offset,
                            self.topic,
                            partition,
                            earliest
                        );
                        self.cursors.insert(partition, Cursor::Active(earliest));
                        self.try_fetch(partition).await
                    }
                    _ => Err(err),
                }
            }
            other => other,
        }
    }

    async fn try_fetch(&mut self, partition: i32) -> Result<usize> {
        let offset = self.start_offset(partition).await?;
        let leader = self
            .client
            .resolve(&self.topic)
            .await?
            .leader(partition)
            .cloned()
            .ok_or_else(|| Error::NoLeaderForTopicPartition(self.topic.clone(), partition))?;

        let correlation_id = self.client.next_correlation_id();
        let mut request = FetchRequest::new(
            correlation_id,
            self.client.client_id(),
            self.max_wait_ms,
            self.min_bytes,
            self.max_bytes,
        );
        request.add(&self.topic, partition, offset, self.partition_max_bytes);
        let response: FetchResponse = self.client.request(&leader, correlation_id, &request).await?;

        let answer = response.partition(&self.topic, partition).ok_or_else(|| {
            Error::protocol(format!("fetch response without {}/{}", self.topic, partition))
        })?;
        match answer.error_code {
            KafkaCode::None => {}
            KafkaCode::UnsupportedVersion => {
                return Err(Error::UnsupportedVersion {
                    api_key: API_KEY_FETCH,
                    version: fetch::request::API_VERSION,
                })
            }
            code => {
                return Err(Error::FetchError {
                    topic: self.topic.clone(),
                    partition,
                    code,
                })
            }
        }

        let mut count = 0;
        let mut skip_to = offset;
        for batch in answer.record_batches()? {
            if batch.is_control() {
                skip_to = skip_to.max(batch.next_offset()?);
                continue;
            }
            for record in batch.records.iter().cloned() {
                let record_offset = batch.offset_of(&record)?;
                if record_offset < offset {
                    continue;
                }
                self.buffer.push_back(ConsumeMessage {
                    topic: self.topic.clone(),
                    partition,
                    offset: record_offset,
                    timestamp: batch.base_timestamp.saturating_add(record.timestamp_delta),
                    key: record.key,
                    value: record.value.unwrap_or_default(),
                    headers: record.headers,
                });
                count += 1;
            }
        }
        if count == 0 && skip_to > offset {
            // only transaction markers, step over them
            self.cursors.insert(partition, Cursor::Active(skip_to));
        }
        tracing::debug!(
            "Fetched {} records from {}/{} at {}, high water mark {}",
            count,
            self.topic,
            partition,
            offset,
            answer.high_water_mark
        );
        Ok(count)
    }

    /// The cursor of `partition`, picking one by the offset policy when
    /// there is none yet.
    pub(crate) async fn start_offset(&mut self, partition: i32) -> Result<i64> {
        if let Cursor::Active(offset) = self.cursor(partition)? {
            return Ok(offset);
        }
        let timestamp = match self.offset_policy {
            OffsetPolicy::Earliest => EARLIEST_TIMESTAMP,
            OffsetPolicy::Latest => LATEST_TIMESTAMP,
        };
        let offset = match self.client.list_offset(&self.topic, partition, timestamp).await {
            Err(err) if err.is_stale_metadata() => {
                tracing::warn!("{}, refreshing metadata and retrying", err);
                self.client.invalidate(&self.topic).await;
                self.client.list_offset(&self.topic, partition, timestamp).await?
            }
            other => other?,
        };
        tracing::debug!(
            "Starting {}/{} at {} ({:?})",
            self.topic,
            partition,
            offset,
            self.offset_policy
        );
        self.cursors.insert(partition, Cursor::Active(offset));
        Ok(offset)
    }
}
