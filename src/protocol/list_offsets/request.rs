//! Encoding and creation for List Offsets requests.
//!
//! Used to ask for the offset of the first message at or after a certain
//! time (ms). There are two special values: [`LATEST_TIMESTAMP`] returns
//! the offset of the next message to be written and
//! [`EARLIEST_TIMESTAMP`] the earliest offset still retained.
//!
//! ### Protocol Def
//! ```text
//! ListOffsets Request (Version: 1) => replica_id [topics]
//!   replica_id => INT32
//!   topics => name [partitions]
//!     name => STRING
//!     partitions => partition_index timestamp
//!       partition_index => INT32
//!       timestamp => INT64
//! ```
//!
//! Note we are using version 1 of the request.

use bytes::BufMut;

use crate::{
    encode::{encode_as_array, ToByte},
    error::Result,
    protocol::{HeaderRequest, API_KEY_LIST_OFFSETS},
};

pub const API_VERSION: i16 = 1;

pub const LATEST_TIMESTAMP: i64 = -1;
pub const EARLIEST_TIMESTAMP: i64 = -2;

/// The base List Offsets request object.
#[derive(Debug)]
pub struct ListOffsetsRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// The broker ID of the requester, or -1 if this request is being made by a normal consumer.
    pub replica_id: i32,
    /// Each topic in the request.
    pub topics: Vec<Topic<'a>>,
}

/// Each topic in the request.
#[derive(Debug)]
pub struct Topic<'a> {
    /// The topic name.
    pub name: &'a str,
    /// Each partition in the request.
    pub partitions: Vec<Partition>,
}

/// Each partition in the request.
#[derive(Debug)]
pub struct Partition {
    /// The partition index.
    pub partition_index: i32,
    /// The target timestamp, or one of the special values.
    pub timestamp: i64,
}

impl<'a> ListOffsetsRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str) -> Self {
        let header =
            HeaderRequest::new(API_KEY_LIST_OFFSETS, API_VERSION, correlation_id, client_id);
        Self {
            header,
            replica_id: -1,
            topics: vec![],
        }
    }

    pub fn add(&mut self, topic_name: &'a str, partition_index: i32, timestamp: i64) {
        let partition = Partition {
            partition_index,
            timestamp,
        };
        match self.topics.iter_mut().find(|topic| topic.name == topic_name) {
            None => self.topics.push(Topic {
                name: topic_name,
                partitions: vec![partition],
            }),
            Some(topic) => {
                if !topic
                    .partitions
                    .iter()
                    .any(|p| p.partition_index == partition_index)
                {
                    topic.partitions.push(partition)
                }
            }
        }
    }
}

impl<'a> ToByte for ListOffsetsRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ListOffsetRequest {:?}", self);
        self.header.encode(buffer)?;
        self.replica_id.encode(buffer)?;
        encode_as_array(buffer, &self.topics, |buffer, topic| {
            topic.name.encode(buffer)?;
            encode_as_array(buffer, &topic.partitions, |buffer, partition| {
                partition.partition_index.encode(buffer)?;
                partition.timestamp.encode(buffer)
            })
        })
    }
}
