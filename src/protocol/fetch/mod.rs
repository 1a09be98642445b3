//! Fetch messages from a broker.

pub mod request;
pub mod response;

#[cfg(test)]
mod test {
    use bytes::Bytes;

    use super::*;
    use crate::{
        encode::ToByte,
        error::{Error, KafkaCode},
        protocol::record_batch::{encode_record_batch, Record},
    };

    #[test]
    fn encode() {
        let b = [
            0, 1, 0, 4, 0, 0, 0, 1, 0, 4, 114, 117, 115, 116, 255, 255, 255, 255, 0, 0, 0, 100, 0,
            0, 0, 1, 0, 0, 117, 48, 0, 0, 0, 0, 1, 0, 9, 112, 117, 114, 99, 104, 97, 115, 101, 115,
            0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 42, 0, 0, 117, 48,
        ];

        let mut req = request::FetchRequest::new(1, "rust", 100, 1, 30000);
        req.add("purchases", 1, 0, 30000);
        req.add("purchases", 1, 42, 30000);

        let mut buffer: Vec<u8> = vec![];
        req.encode(&mut buffer).unwrap();

        assert_eq!(buffer, b);
    }

    fn response_bytes(records: &[u8]) -> Bytes {
        let mut buf = vec![
            0, 0, 0, 1, // correlation id
            0, 0, 0, 0, // throttle
            0, 0, 0, 1, 0, 9, 112, 117, 114, 99, 104, 97, 115, 101, 115, // topic
            0, 0, 0, 1, 0, 0, 0, 0, 0, 0, // partition, error
            0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 2, // watermarks
            255, 255, 255, 255, // no aborted transactions
        ];
        buf.extend_from_slice(&(records.len() as i32).to_be_bytes());
        buf.extend_from_slice(records);
        Bytes::from(buf)
    }

    #[test]
    fn parse() {
        let batch = encode_record_batch(
            0,
            0,
            &[
                Record::new(0, None, Some(Bytes::from_static(b"abc"))),
                Record::new(1, None, Some(Bytes::from_static(b"xyz"))),
            ],
        )
        .unwrap();

        let parsed = response::FetchResponse::try_from(response_bytes(&batch)).unwrap();
        assert_eq!(parsed.header_response.correlation_id, 1);

        let partition = parsed.partition("purchases", 0).unwrap();
        assert_eq!(partition.error_code, KafkaCode::None);
        assert_eq!(partition.high_water_mark, 2);
        assert!(partition.aborted_transactions.is_empty());

        let batches = partition.record_batches().unwrap();
        let values: Vec<_> = batches[0]
            .records
            .iter()
            .map(|r| r.value.clone().unwrap())
            .collect();
        assert_eq!(values, vec![Bytes::from("abc"), Bytes::from("xyz")]);
        assert!(parsed.partition("purchases", 1).is_none());
    }

    #[test]
    fn parse_corrupt_batch() {
        let mut batch =
            encode_record_batch(0, 0, &[Record::new(0, None, Some(Bytes::from("abc")))]).unwrap();
        let last = batch.len() - 2;
        batch[last] = b'x';

        let parsed = response::FetchResponse::try_from(response_bytes(&batch)).unwrap();
        let partition = parsed.partition("purchases", 0).unwrap();
        assert!(matches!(
            partition.record_batches(),
            Err(Error::CorruptFrame { .. })
        ));
    }
}
