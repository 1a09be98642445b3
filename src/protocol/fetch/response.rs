//! Parsing and processing for Fetch responses.
//!
//! ### Protocol Def
//! ```text
//! Fetch Response (Version: 4) => throttle_time_ms [responses]
//!   throttle_time_ms => INT32
//!   responses => topic [partitions]
//!     topic => STRING
//!     partitions => partition_index error_code high_watermark last_stable_offset [aborted_transactions] records
//!       partition_index => INT32
//!       error_code => INT16
//!       high_watermark => INT64
//!       last_stable_offset => INT64
//!       aborted_transactions => producer_id first_offset
//!         producer_id => INT64
//!         first_offset => INT64
//!       records => RECORDS
//! ```
//!
//! The records field is kept as raw bytes while parsing the response;
//! [`Partition::record_batches`] splits and checksums it, so a corrupt
//! batch surfaces as [`Error::CorruptFrame`] instead of a parse failure.

use bytes::Bytes;
use nom::{
    number::complete::{be_i32, be_i64},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{
        self, parse_header_response,
        record_batch::{decode_record_batches, RecordBatch},
        HeaderResponse,
    },
};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchResponse {
    pub header_response: HeaderResponse,
    /// The duration in milliseconds for which the request was throttled due to a quota violation, or zero if the request did not violate any quota.
    pub throttle_time_ms: i32,
    /// The response topics.
    pub topics: Vec<Topic>,
}

impl FetchResponse {
    pub fn partition(&self, topic: &str, partition_index: i32) -> Option<&Partition> {
        self.topics
            .iter()
            .filter(|t| t.name == topic.as_bytes())
            .flat_map(|t| t.partitions.iter())
            .find(|p| p.id == partition_index)
    }
}

// this helps us cast the server response into this type
impl TryFrom<Bytes> for FetchResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing FetchResponse {:?}", s);
        let (_, fetch_response) = parse_fetch_response(NomBytes::new(s.clone()))
            .map_err(|err| protocol::parse_failure("FetchResponse", err, &s))?;
        tracing::trace!("Parsed FetchResponse {:?}", fetch_response);
        Ok(fetch_response)
    }
}

/// The response topics.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub name: Bytes,
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub id: i32,
    pub error_code: KafkaCode,
    pub high_water_mark: i64,
    pub last_stable_offset: i64,
    pub aborted_transactions: Vec<AbortedTransactions>,
    pub records: Option<Bytes>,
}

impl Partition {
    pub fn record_batches(&self) -> Result<Vec<RecordBatch>> {
        match &self.records {
            Some(records) => decode_record_batches(records.clone()),
            None => Ok(vec![]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbortedTransactions {
    pub producer_id: i64,
    pub first_offset: i64,
}

pub fn parse_fetch_response(s: NomBytes) -> IResult<NomBytes, FetchResponse> {
    let (s, header_response) = parse_header_response(s)?;
    let (s, throttle_time_ms) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        FetchResponse {
            header_response,
            throttle_time_ms,
            topics,
        },
    ))
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, name) = parser::parse_string(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;

    Ok((s, Topic { name, partitions }))
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, id) = be_i32(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, high_water_mark) = be_i64(s)?;
    let (s, last_stable_offset) = be_i64(s)?;
    let (s, aborted_transactions) = parser::parse_array(parse_aborted_transactions)(s)?;
    let (s, records) = parser::parse_nullable_bytes(s)?;

    Ok((
        s,
        Partition {
            id,
            error_code,
            high_water_mark,
            last_stable_offset,
            aborted_transactions,
            records,
        },
    ))
}

fn parse_aborted_transactions(s: NomBytes) -> IResult<NomBytes, AbortedTransactions> {
    let (s, producer_id) = be_i64(s)?;
    let (s, first_offset) = be_i64(s)?;

    Ok((
        s,
        AbortedTransactions {
            producer_id,
            first_offset,
        },
    ))
}
