//! Parsing and processing for Metadata responses.
//!
//! The response contains metadata for each partition, with
//! partitions grouped together by topic. This metadata
//! refers to brokers by their broker id. The brokers each
//! have a host and port.
//!
//! ### Protocol Def
//! ```text
//! Metadata Response (Version: 1) => [brokers] controller_id [topics]
//!   brokers => node_id host port rack
//!     node_id => INT32
//!     host => STRING
//!     port => INT32
//!     rack => NULLABLE_STRING
//!   controller_id => INT32
//!   topics => error_code name is_internal [partitions]
//!     error_code => INT16
//!     name => STRING
//!     is_internal => BOOLEAN
//!     partitions => error_code partition_index leader_id [replica_nodes] [isr_nodes]
//!       error_code => INT16
//!       partition_index => INT32
//!       leader_id => INT32
//!       replica_nodes => INT32
//!       isr_nodes => INT32
//! ```

use bytes::Bytes;
use nom::{
    number::complete::{be_i32, be_i8},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    network::BrokerAddress,
    parser, protocol,
};

/// The base Metadata response object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MetadataResponse {
    pub header_response: protocol::HeaderResponse,
    /// Each broker in the response.
    pub brokers: Vec<Broker>,
    /// The ID of the controller broker.
    pub controller_id: i32,
    /// Each topic in the response.
    pub topics: Vec<Topic>,
}

impl MetadataResponse {
    pub fn broker(&self, node_id: i32) -> Option<&Broker> {
        self.brokers.iter().find(|broker| broker.node_id == node_id)
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|topic| topic.name == name.as_bytes())
    }
}

impl TryFrom<Bytes> for MetadataResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing MetadataResponse {:?}", s);
        let (_, metadata) = parse_metadata_response(NomBytes::new(s.clone()))
            .map_err(|err| protocol::parse_failure("MetadataResponse", err, &s))?;
        tracing::trace!("Parsed MetadataResponse {:?}", metadata);
        Ok(metadata)
    }
}

pub fn parse_metadata_response(s: NomBytes) -> IResult<NomBytes, MetadataResponse> {
    let (s, header_response) = protocol::parse_header_response(s)?;
    let (s, brokers) = parser::parse_array(parse_broker)(s)?;
    let (s, controller_id) = be_i32(s)?;
    let (s, topics) = parser::parse_array(parse_topic)(s)?;

    Ok((
        s,
        MetadataResponse {
            header_response,
            brokers,
            controller_id,
            topics,
        },
    ))
}

/// Each broker in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Broker {
    /// The broker ID.
    pub node_id: i32,
    /// The broker hostname.
    pub host: Bytes,
    /// The broker port.
    pub port: i32,
    /// The rack of the broker, or null if it has not been assigned to a rack.
    pub rack: Option<Bytes>,
}

impl Broker {
    pub fn address(&self) -> Result<BrokerAddress> {
        let host = std::str::from_utf8(&self.host).map_err(|_| Error::DecodingUtf8Error)?;
        let port = u16::try_from(self.port)
            .map_err(|_| Error::InvalidBrokerAddress(format!("{}:{}", host, self.port)))?;
        Ok(BrokerAddress {
            host: host.to_owned(),
            port,
        })
    }
}

fn parse_broker(s: NomBytes) -> IResult<NomBytes, Broker> {
    let (s, node_id) = be_i32(s)?;
    let (s, host) = parser::parse_string(s)?;
    let (s, port) = be_i32(s)?;
    let (s, rack) = parser::parse_nullable_string(s)?;

    Ok((
        s,
        Broker {
            node_id,
            host,
            port,
            rack,
        },
    ))
}

/// Each topic in the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// The topic error, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The topic name.
    pub name: Bytes,
    /// True if the topic is internal.
    pub is_internal: bool,
    /// Each partition in the topic.
    pub partitions: Vec<Partition>,
}

fn parse_topic(s: NomBytes) -> IResult<NomBytes, Topic> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, name) = parser::parse_string(s)?;
    let (s, is_internal) = be_i8(s)?;
    let (s, partitions) = parser::parse_array(parse_partition)(s)?;

    Ok((
        s,
        Topic {
            error_code,
            name,
            is_internal: is_internal != 0,
            partitions,
        },
    ))
}

/// Each partition in the topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// The partition error, or 0 if there was no error.
    pub error_code: KafkaCode,
    /// The partition index.
    pub partition_index: i32,
    /// The ID of the leader broker, -1 while an election is running.
    pub leader_id: i32,
    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,
    /// The set of nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}

fn parse_partition(s: NomBytes) -> IResult<NomBytes, Partition> {
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, partition_index) = be_i32(s)?;
    let (s, leader_id) = be_i32(s)?;
    let (s, replica_nodes) = parser::parse_array(be_i32)(s)?;
    let (s, isr_nodes) = parser::parse_array(be_i32)(s)?;

    Ok((
        s,
        Partition {
            error_code,
            partition_index,
            leader_id,
            replica_nodes,
            isr_nodes,
        },
    ))
}
