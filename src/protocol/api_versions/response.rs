//! Parsing and processing for ApiVersions responses.
//!
//! ### Protocol Def
//! ```text
//! ApiVersions Response (Version: 0) => error_code [api_keys]
//!   error_code => INT16
//!   api_keys => api_key min_version max_version
//!     api_key => INT16
//!     min_version => INT16
//!     max_version => INT16
//! ```

use bytes::Bytes;
use nom::{number::complete::be_i16, IResult};
use nombytes::NomBytes;

use crate::{
    error::{Error, KafkaCode, Result},
    parser,
    protocol::{self, parse_header_response, HeaderResponse},
};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiVersionsResponse {
    pub header: HeaderResponse,
    /// The top-level error code.
    pub error_code: KafkaCode,
    /// The APIs supported by the broker.
    pub api_keys: Vec<ApiVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApiVersion {
    /// The API index.
    pub api_key: i16,
    /// The minimum supported version, inclusive.
    pub min_version: i16,
    /// The maximum supported version, inclusive.
    pub max_version: i16,
}

impl ApiVersionsResponse {
    pub fn supports(&self, api_key: i16, version: i16) -> bool {
        self.api_keys.iter().any(|api| {
            api.api_key == api_key && api.min_version <= version && version <= api.max_version
        })
    }

    /// Fails with the first (api key, version) pair the broker cannot serve.
    pub fn check(&self, wanted: &[(i16, i16)]) -> Result<()> {
        if self.error_code == KafkaCode::UnsupportedVersion {
            return Err(Error::UnsupportedVersion {
                api_key: protocol::API_KEY_API_VERSIONS,
                version: super::request::API_VERSION,
            });
        }
        if self.error_code != KafkaCode::None {
            tracing::error!("ERROR: ApiVersions answered {:?}", self.error_code);
            return Err(Error::KafkaError(self.error_code));
        }
        match wanted
            .iter()
            .find(|(api_key, version)| !self.supports(*api_key, *version))
        {
            Some(&(api_key, version)) => Err(Error::UnsupportedVersion { api_key, version }),
            None => Ok(()),
        }
    }
}

impl TryFrom<Bytes> for ApiVersionsResponse {
    type Error = Error;

    fn try_from(s: Bytes) -> Result<Self> {
        tracing::trace!("Parsing ApiVersionsResponse {:?}", s);
        let (_, api_versions) = parse_api_versions_response(NomBytes::new(s.clone()))
            .map_err(|err| protocol::parse_failure("ApiVersionsResponse", err, &s))?;
        tracing::trace!("Parsed ApiVersionsResponse {:?}", api_versions);
        Ok(api_versions)
    }
}

pub fn parse_api_versions_response(s: NomBytes) -> IResult<NomBytes, ApiVersionsResponse> {
    let (s, header) = parse_header_response(s)?;
    let (s, error_code) = parser::parse_kafka_code(s)?;
    let (s, api_keys) = parser::parse_array(parse_api_version)(s)?;

    Ok((
        s,
        ApiVersionsResponse {
            header,
            error_code,
            api_keys,
        },
    ))
}

fn parse_api_version(s: NomBytes) -> IResult<NomBytes, ApiVersion> {
    let (s, api_key) = be_i16(s)?;
    let (s, min_version) = be_i16(s)?;
    let (s, max_version) = be_i16(s)?;

    Ok((
        s,
        ApiVersion {
            api_key,
            min_version,
            max_version,
        },
    ))
}
