//! Encoding and creation for Metadata requests.
//!
//! ### Example
//! ```rust
//! use libkafka::protocol::MetadataRequest;
//!
//! let topics = ["purchases"];
//! let metadata_request = MetadataRequest::new(1, "libkafka", &topics);
//! ```
//!
//! ### Protocol Def
//! ```text
//! Metadata Request (Version: 1) => [topics]
//!   topics => name
//!   name => STRING
//! ```
//!
//! Note we are using version 1 of the request. A null topic array asks
//! for every topic, this client always names the topics it wants.

use bytes::BufMut;

use crate::{
    encode::{AsStrings, ToByte},
    error::Result,
    protocol::{HeaderRequest, API_KEY_METADATA},
};

pub const API_VERSION: i16 = 1;

/// The base Metadata request object.
#[derive(Debug)]
pub struct MetadataRequest<'a, T> {
    pub header: HeaderRequest<'a>,
    /// The topics to fetch metadata for.
    pub topics: &'a [T],
}

impl<'a, T: AsRef<str>> MetadataRequest<'a, T> {
    pub fn new(correlation_id: i32, client_id: &'a str, topics: &'a [T]) -> MetadataRequest<'a, T> {
        MetadataRequest {
            header: HeaderRequest::new(API_KEY_METADATA, API_VERSION, correlation_id, client_id),
            topics,
        }
    }
}

impl<'a, T: AsRef<str> + 'a> ToByte for MetadataRequest<'a, T> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.header.encode(buffer)?;
        AsStrings(self.topics).encode(buffer)?;
        Ok(())
    }
}
