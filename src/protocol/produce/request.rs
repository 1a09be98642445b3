//! Encoding and creation for Produce requests.
//!
//! ### Protocol Def
//! ```text
//! Produce Request (Version: 3) => transactional_id acks timeout_ms [topic_data]
//!   transactional_id => NULLABLE_STRING
//!   acks => INT16
//!   timeout_ms => INT32
//!   topic_data => name [partition_data]
//!     name => STRING
//!     partition_data => index records
//!       index => INT32
//!       records => RECORDS
//! ```
//!
//! Each partition carries exactly one record batch holding every record
//! added for it, in the order they were added.

use bytes::{BufMut, Bytes};

use crate::{
    encode::{encode_as_array, ToByte},
    error::Result,
    protocol::{
        record_batch::{encode_record_batch, Header, Record},
        HeaderRequest, API_KEY_PRODUCE,
    },
    utils,
};

pub const API_VERSION: i16 = 3;

#[derive(Debug)]
pub struct ProduceRequest<'a> {
    pub header: HeaderRequest<'a>,
    /// Null for producers outside of a transaction.
    pub transactional_id: Option<&'a str>,
    /// The number of acknowledgments the producer requires the leader to have received before considering a request complete. Allowed values: 0 for no acknowledgments, 1 for only the leader and -1 for the full ISR.
    pub required_acks: i16,
    /// The timeout to await a response in milliseconds.
    pub timeout_ms: i32,
    /// Base timestamp of every batch in the request.
    pub timestamp: i64,
    /// Each topic to produce to.
    pub topic_partitions: Vec<TopicPartitionProduceRequest<'a>>,
}

#[derive(Debug)]
pub struct TopicPartitionProduceRequest<'a> {
    /// The topic name.
    pub name: &'a str,
    /// Each partition to produce to.
    pub partitions: Vec<PartitionProduceRequest>,
}

#[derive(Debug)]
pub struct PartitionProduceRequest {
    /// The partition index.
    pub partition: i32,
    /// The records, numbered by their position in the batch.
    pub records: Vec<Record>,
}

impl<'a> ProduceRequest<'a> {
    pub fn new(
        required_acks: i16,
        timeout_ms: i32,
        correlation_id: i32,
        client_id: &'a str,
    ) -> ProduceRequest {
        ProduceRequest {
            header: HeaderRequest::new(API_KEY_PRODUCE, API_VERSION, correlation_id, client_id),
            transactional_id: None,
            required_acks,
            timeout_ms,
            timestamp: utils::now(),
            topic_partitions: vec![],
        }
    }

    pub fn add(
        &mut self,
        topic: &'a str,
        partition: i32,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<Header>,
    ) {
        for tp in &mut self.topic_partitions {
            if tp.name == topic {
                tp.add(partition, key, value, headers);
                return;
            }
        }
        let mut tp = TopicPartitionProduceRequest {
            name: topic,
            partitions: vec![],
        };
        tp.add(partition, key, value, headers);
        self.topic_partitions.push(tp);
    }

    pub fn record_count(&self) -> usize {
        self.topic_partitions
            .iter()
            .flat_map(|tp| tp.partitions.iter())
            .map(|p| p.records.len())
            .sum()
    }
}

impl<'a> TopicPartitionProduceRequest<'a> {
    fn add(
        &mut self,
        partition: i32,
        key: Option<Bytes>,
        value: Option<Bytes>,
        headers: Vec<Header>,
    ) {
        let pp = match self.partitions.iter().position(|pp| pp.partition == partition) {
            Some(index) => &mut self.partitions[index],
            None => {
                self.partitions.push(PartitionProduceRequest {
                    partition,
                    records: vec![],
                });
                let last = self.partitions.len() - 1;
                &mut self.partitions[last]
            }
        };
        let mut record = Record::new(pp.records.len() as i64, key, value);
        record.headers = headers;
        pp.records.push(record);
    }
}

impl<'a> ToByte for ProduceRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ProduceRequest {:?}", self);
        self.header.encode(buffer)?;
        self.transactional_id.encode(buffer)?;
        self.required_acks.encode(buffer)?;
        self.timeout_ms.encode(buffer)?;
        encode_as_array(buffer, &self.topic_partitions, |buffer, tp| {
            tp.name.encode(buffer)?;
            encode_as_array(buffer, &tp.partitions, |buffer, pp| {
                pp.partition.encode(buffer)?;
                // ~ render the whole batch first, the crc covers all of it
                let batch = encode_record_batch(0, self.timestamp, &pp.records)?;
                batch.as_slice().encode(buffer)
            })
        })
    }
}
