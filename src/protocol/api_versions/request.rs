//! Encoding and creation for ApiVersions requests.
//!
//! ### Protocol Def
//! ```text
//! ApiVersions Request (Version: 0) =>
//! ```
//!
//! Version 0 is answered by every broker, even ones too old to know
//! the versions this client wants, so it is safe as a first request.

use bytes::BufMut;

use crate::{
    encode::ToByte,
    error::Result,
    protocol::{HeaderRequest, API_KEY_API_VERSIONS},
};

pub const API_VERSION: i16 = 0;

#[derive(Debug)]
pub struct ApiVersionsRequest<'a> {
    pub header: HeaderRequest<'a>,
}

impl<'a> ApiVersionsRequest<'a> {
    pub fn new(correlation_id: i32, client_id: &'a str) -> Self {
        Self {
            header: HeaderRequest::new(
                API_KEY_API_VERSIONS,
                API_VERSION,
                correlation_id,
                client_id,
            ),
        }
    }
}

impl<'a> ToByte for ApiVersionsRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        tracing::trace!("Encoding ApiVersionsRequest {:?}", self);
        self.header.encode(buffer)
    }
}
