//! Encoding and creation for Fetch requests.
//!
//! ### Example
//! ```rust
//! use libkafka::protocol::FetchRequest;
//!
//! let mut fetch_request = FetchRequest::new(1, "libkafka", 100, 1, 1 << 20);
//! fetch_request.add("purchases", 0, 42, 1 << 20);
//! ```
//!
//! ### Protocol Def
//! ```text
//! Fetch Request (Version: 4) => replica_id max_wait_ms min_bytes max_bytes isolation_level [topics]
//!   replica_id => INT32
//!   max_wait_ms => INT32
//!   min_bytes => INT32
//!   max_bytes => INT32
//!   isolation_level => INT8
//!   topics => topic [partitions]
//!     topic => STRING
//!     partitions => partition fetch_offset partition_max_bytes
//!       partition => INT32
//!       fetch_offset => INT64
//!       partition_max_bytes => INT32
//! ```
//!
//! Note we are using version 4 of the request, the first one whose
//! responses carry record batches.

use bytes::BufMut;

use crate::{
    encode::{encode_as_array, ToByte},
    error::Result,
    protocol::{HeaderRequest, API_KEY_FETCH},
};

pub const API_VERSION: i16 = 4;

/// Every record is visible, transactional or not.
pub const READ_UNCOMMITTED: i8 = 0;

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The broker ID of the follower, of -1 if this request is from a consumer.
    pub replica: i32,
    /// The maximum time in milliseconds to wait for the response.
    pub max_wait_ms: i32,
    /// The minimum bytes to accumulate in the response.
    pub min_bytes: i32,
    /// The maximum bytes to fetch. See KIP-74 for cases where this limit may not be honored.
    pub max_bytes: i32,
    /// Controls the visibility of transactional records.
    pub isolation_level: i8,
    /// The topics to fetch.
    pub topics: Vec<TopicPartition<'a>>,
}

/// The topics to fetch.
#[derive(Debug, Clone)]
pub struct TopicPartition<'a> {
    /// The name of the topic to fetch.
    pub topic_name: &'a str,
    /// The partitions to fetch.
    pub partitions: Vec<Partition>,
}

/// The partitions to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The message offset.
    pub offset: i64,
    /// The maximum bytes to fetch from this partition.
    pub max_bytes: i32,
}

impl<'a> FetchRequest<'a> {
    pub fn new(
        correlation_id: i32,
        client_id: &'a str,
        max_wait_ms: i32,
        min_bytes: i32,
        max_bytes: i32,
    ) -> FetchRequest<'a> {
        FetchRequest {
            header: HeaderRequest::new(API_KEY_FETCH, API_VERSION, correlation_id, client_id),
            replica: -1,
            max_wait_ms,
            min_bytes,
            max_bytes,
            isolation_level: READ_UNCOMMITTED,
            topics: vec![],
        }
    }

    /// Ask for `partition_index` from `offset`. Adding the same partition
    /// twice moves its offset.
    pub fn add(&mut self, topic_name: &'a str, partition_index: i32, offset: i64, max_bytes: i32) {
        let partition = Partition {
            partition_index,
            offset,
            max_bytes,
        };
        let Some(topic) = self
            .topics
            .iter_mut()
            .find(|topic| topic.topic_name == topic_name)
        else {
            self.topics.push(TopicPartition {
                topic_name,
                partitions: vec![partition],
            });
            return;
        };
        match topic
            .partitions
            .iter_mut()
            .find(|p| p.partition_index == partition_index)
        {
            Some(existing) => *existing = partition,
            None => topic.partitions.push(partition),
        }
    }
}

impl<'a> ToByte for FetchRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding FetchRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica.encode(buffer)?;
        self.max_wait_ms.encode(buffer)?;
        self.min_bytes.encode(buffer)?;
        self.max_bytes.encode(buffer)?;
        self.isolation_level.encode(buffer)?;
        encode_as_array(buffer, &self.topics, |buffer, topic| {
            topic.topic_name.encode(buffer)?;
            encode_as_array(buffer, &topic.partitions, |buffer, partition| {
                partition.partition_index.encode(buffer)?;
                partition.offset.encode(buffer)?;
                partition.max_bytes.encode(buffer)
            })
        })
    }
}
