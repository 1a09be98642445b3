//! Ask a broker which versions of each API it serves.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::{
        encode::ToByte,
        error::{Error, KafkaCode},
        protocol::SUPPORTED_VERSIONS,
    };

    #[test]
    fn encode() {
        let mut buffer = vec![];
        request::ApiVersionsRequest::new(9, "rust")
            .encode(&mut buffer)
            .unwrap();
        assert_eq!(buffer, [0, 18, 0, 0, 0, 0, 0, 9, 0, 4, 114, 117, 115, 116]);
    }

    fn response(fetch_max: u8) -> Bytes {
        Bytes::from(vec![
            0, 0, 0, 9, 0, 0, // header, error
            0, 0, 0, 5, // api keys
            0, 0, 0, 0, 0, 9, // produce
            0, 1, 0, 0, 0, fetch_max, // fetch
            0, 2, 0, 0, 0, 5, // list offsets
            0, 3, 0, 0, 0, 12, // metadata
            0, 18, 0, 0, 0, 3, // api versions
        ])
    }

    #[test]
    fn parse_and_check() {
        let parsed = response::ApiVersionsResponse::try_from(response(11)).unwrap();
        assert_eq!(parsed.error_code, KafkaCode::None);
        assert_eq!(parsed.api_keys.len(), 5);
        assert!(parsed.supports(1, 4));
        assert!(!parsed.supports(1, 12));
        assert!(parsed.check(&SUPPORTED_VERSIONS).is_ok());
    }

    #[test]
    fn old_broker_is_rejected() {
        let parsed = response::ApiVersionsResponse::try_from(response(3)).unwrap();
        assert_eq!(
            parsed.check(&SUPPORTED_VERSIONS),
            Err(Error::UnsupportedVersion {
                api_key: 1,
                version: 4
            })
        );
    }
}
