//! Bytecode protocol requests & responses.
//!
//! This module implements the subset of the bytecode protocol outlined in
//! the [Kafka Documentation](https://kafka.apache.org/protocol.html) that
//! a single-consumer client needs: Metadata, Produce, Fetch, ListOffsets
//! and ApiVersions.
//!
//! The module is set up as a list of message pairs containing two files
//! each corresponding to the request and response.
//!
//! The request files hold the logic for creating and encoding structs that
//! will be sent to the broker. The response files hold the logic for parsing
//! and processing the messages coming from the broker.
//!
//! Every frame on the wire is a 4 byte big-endian size followed by the
//! header and body. [`encode_frame`] and [`decode_frame`] deal with the
//! size prefix, [`decode`] checks the correlation id and parses the typed
//! response.

pub mod api_versions;
pub mod fetch;
pub mod list_offsets;
pub mod metadata;
pub mod produce;
pub mod record_batch;

use bytes::{Buf, BufMut, Bytes};
use nom::{number::complete::be_i32, IResult};
use nombytes::NomBytes;

// re exporting these for ease
pub use self::{
    api_versions::{request::ApiVersionsRequest, response::ApiVersionsResponse},
    fetch::{request::FetchRequest, response::FetchResponse},
    list_offsets::{request::ListOffsetsRequest, response::ListOffsetsResponse},
    metadata::{request::MetadataRequest, response::MetadataResponse},
    produce::{request::ProduceRequest, response::ProduceResponse},
    record_batch::{Header, Record, RecordBatch},
};
use crate::{
    encode::ToByte,
    error::{Error, Result},
};

pub const API_KEY_PRODUCE: i16 = 0;
pub const API_KEY_FETCH: i16 = 1;
pub const API_KEY_LIST_OFFSETS: i16 = 2;
pub const API_KEY_METADATA: i16 = 3;
pub const API_KEY_API_VERSIONS: i16 = 18;

/// The (api key, version) pairs this client speaks.
pub const SUPPORTED_VERSIONS: [(i16, i16); 5] = [
    (API_KEY_PRODUCE, produce::request::API_VERSION),
    (API_KEY_FETCH, fetch::request::API_VERSION),
    (API_KEY_LIST_OFFSETS, list_offsets::request::API_VERSION),
    (API_KEY_METADATA, metadata::request::API_VERSION),
    (API_KEY_API_VERSIONS, api_versions::request::API_VERSION),
];

#[derive(Debug, Clone)]
pub struct HeaderRequest<'a> {
    /// The API key of this request.
    pub api_key: i16,
    /// The API version of this request.
    pub api_version: i16,
    /// The correlation ID of this request.
    pub correlation_id: i32,
    /// The client ID string.
    pub client_id: &'a str,
}

impl<'a> HeaderRequest<'a> {
    /// Create new header request.
    ///
    /// This goes at the beginning of every single request.
    pub fn new(
        api_key: i16,
        api_version: i16,
        correlation_id: i32,
        client_id: &'a str,
    ) -> HeaderRequest {
        HeaderRequest {
            api_key,
            api_version,
            correlation_id,
            client_id,
        }
    }
}

impl<'a> ToByte for HeaderRequest<'a> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        self.api_key.encode(buffer)?;
        self.api_version.encode(buffer)?;
        self.correlation_id.encode(buffer)?;
        self.client_id.encode(buffer)?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct HeaderResponse {
    /// The correlation ID of this response.
    pub correlation_id: i32,
}

pub fn parse_header_response(s: NomBytes) -> IResult<NomBytes, HeaderResponse> {
    let (s, correlation_id) = be_i32(s)?;
    Ok((s, HeaderResponse { correlation_id }))
}

/// Serialize a request into a size delimited frame.
///
/// ### Example
/// ```rust
/// use libkafka::protocol::{encode_frame, MetadataRequest};
///
/// let topics = ["purchases"];
/// let frame = encode_frame(&MetadataRequest::new(1, "libkafka", &topics)).unwrap();
/// assert_eq!(&frame[..4], &[0, 0, 0, 33]);
/// ```
pub fn encode_frame<R: ToByte + ?Sized>(req: &R) -> Result<Bytes> {
    let mut buffer = Vec::with_capacity(64);
    buffer.extend_from_slice(&[0, 0, 0, 0]);
    req.encode(&mut buffer)?;

    let size = i32::try_from(buffer.len() - 4)
        .map_err(|_| Error::EncodingError("request larger than i32::MAX"))?;
    size.encode(&mut &mut buffer[..4])?;

    Ok(Bytes::from(buffer))
}

/// Strip the size prefix from a frame, checking that the declared size
/// matches the bytes received.
pub fn decode_frame(mut frame: Bytes) -> Result<Bytes> {
    if frame.len() < 4 {
        return Err(Error::protocol(format!(
            "frame of {} bytes has no size prefix",
            frame.len()
        )));
    }
    let declared = frame.get_i32();
    if declared < 0 || declared as usize != frame.len() {
        return Err(Error::protocol(format!(
            "frame declared {} bytes but {} were received",
            declared,
            frame.len()
        )));
    }
    Ok(frame)
}

/// Parse a response body into `R` after checking it answers the request
/// sent with `correlation_id`.
pub fn decode<R>(body: Bytes, correlation_id: i32) -> Result<R>
where
    R: TryFrom<Bytes, Error = Error>,
{
    if body.len() < 4 {
        return Err(Error::protocol("response is missing its header"));
    }
    let received = (&body[..4]).get_i32();
    if received != correlation_id {
        return Err(Error::protocol(format!(
            "correlation id {} does not match request {}",
            received, correlation_id
        )));
    }
    R::try_from(body)
}

/// Logs and wraps a nom failure for the response named `what`.
pub(crate) fn parse_failure<E: std::fmt::Debug>(what: &str, err: E, bytes: &Bytes) -> Error {
    tracing::error!("ERROR: Failed parsing {} {:?}", what, err);
    tracing::trace!("{} Bytes {:?}", what, bytes);
    Error::protocol(format!("failed parsing {}", what))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn header_request() {
        let mut buf = vec![];
        HeaderRequest::new(API_KEY_METADATA, 1, 7, "rust")
            .encode(&mut buf)
            .unwrap();
        assert_eq!(buf, [0, 3, 0, 1, 0, 0, 0, 7, 0, 4, 114, 117, 115, 116]);
    }

    #[test]
    fn frame_carries_size_prefix() {
        let frame = encode_frame(&HeaderRequest::new(API_KEY_FETCH, 4, 1, "")).unwrap();
        assert_eq!(&frame[..], [0, 0, 0, 10, 0, 1, 0, 4, 0, 0, 0, 1, 0, 0]);
        assert_eq!(decode_frame(frame).unwrap().len(), 10);
    }

    #[test]
    fn frame_size_mismatch() {
        let frame = Bytes::from_static(&[0, 0, 0, 9, 0, 0, 0, 1]);
        assert!(matches!(
            decode_frame(frame),
            Err(Error::ProtocolError { .. })
        ));
        assert!(matches!(
            decode_frame(Bytes::from_static(&[0, 0])),
            Err(Error::ProtocolError { .. })
        ));
    }

    #[test]
    fn correlation_mismatch() {
        let body = Bytes::from_static(&[0, 0, 0, 2, 0, 0, 0, 0]);
        assert!(matches!(
            decode::<ApiVersionsResponse>(body, 3),
            Err(Error::ProtocolError { .. })
        ));
    }
}
