//! Record batches, the unit in which produce requests carry and fetch
//! responses return records.
//!
//! ### Protocol Def
//! ```text
//! RECORD BATCH
//!     baseOffset: int64
//!     batchLength: int32
//!     partitionLeaderEpoch: int32
//!     magic: int8 (current magic value is 2)
//!     crc: uint32 (CRC-32C of attributes..end)
//!     attributes: int16
//!         bit 0~2: compression codec
//!         bit 3: timestampType
//!         bit 4: isTransactional
//!         bit 5: isControlBatch
//!     lastOffsetDelta: int32
//!     baseTimestamp: int64
//!     maxTimestamp: int64
//!     producerId: int64
//!     producerEpoch: int16
//!     baseSequence: int32
//!     records: [Record]
//!
//! Record
//!     length: varint
//!     attributes: int8
//!     timestampDelta: varlong
//!     offsetDelta: varint
//!     keyLength: varint
//!     key: byte[]
//!     valueLen: varint
//!     value: byte[]
//!     Headers => [Header]
//!
//! Header
//!     headerKeyLength: varint
//!     headerKey: String
//!     headerValueLength: varint
//!     Value: byte[]
//! ```
//!
//! Batches are written uncompressed. Fetched batches may also be gzip
//! compressed, the broker recompresses when the topic asks for it.

use bytes::{Buf, Bytes};
use nom::{
    bytes::complete::take,
    number::complete::{be_i16, be_i32, be_i64, be_i8, be_u32},
    IResult,
};
use nombytes::NomBytes;

use crate::{
    encode::{encode_varint, encode_varint_bytes, ToByte},
    error::{Error, Result},
    parser,
    utils::{to_crc32c, uncompress},
};

pub const MAGIC: i8 = 2;

/// Bytes before the record array, the record count included.
pub const BATCH_HEADER_SIZE: usize = 61;
/// Base offset and batch length are not counted in the batch length.
pub const LOG_OVERHEAD: usize = 12;

const LENGTH_OFFSET: usize = 8;
const MAGIC_OFFSET: usize = 16;
const CRC_OFFSET: usize = 17;
const ATTRIBUTES_OFFSET: usize = 21;

const COMPRESSION_MASK: i16 = 0x07;
const GZIP: i16 = 1;
const CONTROL_FLAG: i16 = 1 << 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub key: Bytes,
    pub value: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub attributes: i8,
    pub timestamp_delta: i64,
    pub offset_delta: i64,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub headers: Vec<Header>,
}

impl Record {
    pub fn new(offset_delta: i64, key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            attributes: 0,
            timestamp_delta: 0,
            offset_delta,
            key,
            value,
            headers: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub base_offset: i64,
    pub batch_length: i32,
    pub partition_leader_epoch: i32,
    pub magic: i8,
    pub crc: u32,
    pub attributes: i16,
    pub last_offset_delta: i32,
    pub base_timestamp: i64,
    pub max_timestamp: i64,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub base_sequence: i32,
    pub records: Vec<Record>,
}

impl RecordBatch {
    /// Control batches mark transaction boundaries and carry no user data.
    pub fn is_control(&self) -> bool {
        self.attributes & CONTROL_FLAG != 0
    }

    /// The offset following the last record of this batch.
    pub fn next_offset(&self) -> Result<i64> {
        self.base_offset
            .checked_add(self.last_offset_delta as i64 + 1)
            .ok_or_else(|| overflow(self.base_offset))
    }

    /// Absolute offset of one of this batch's records.
    pub fn offset_of(&self, record: &Record) -> Result<i64> {
        self.base_offset
            .checked_add(record.offset_delta)
            .ok_or_else(|| overflow(self.base_offset))
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

fn overflow(base_offset: i64) -> Error {
    Error::protocol(format!("record offsets overflow base offset {}", base_offset))
}

/// Render records into one uncompressed batch with no producer id.
///
/// `offset_delta` and `timestamp_delta` are taken from each record as
/// given, the caller numbers them.
pub fn encode_record_batch(
    base_offset: i64,
    base_timestamp: i64,
    records: &[Record],
) -> Result<Vec<u8>> {
    let last_offset_delta = records.iter().map(|r| r.offset_delta).max().unwrap_or(0);
    let last_offset_delta = i32::try_from(last_offset_delta)
        .map_err(|_| Error::EncodingError("offset delta larger than i32::MAX"))?;
    let max_timestamp =
        base_timestamp + records.iter().map(|r| r.timestamp_delta).max().unwrap_or(0);
    let record_count = i32::try_from(records.len())
        .map_err(|_| Error::EncodingError("more than i32::MAX records in a batch"))?;

    let mut buf = Vec::with_capacity(BATCH_HEADER_SIZE + records.len() * 16);
    base_offset.encode(&mut buf)?;
    0i32.encode(&mut buf)?; // batch length, filled in below
    0i32.encode(&mut buf)?; // partition leader epoch
    MAGIC.encode(&mut buf)?;
    0u32.encode(&mut buf)?; // crc, filled in below
    0i16.encode(&mut buf)?; // attributes
    last_offset_delta.encode(&mut buf)?;
    base_timestamp.encode(&mut buf)?;
    max_timestamp.encode(&mut buf)?;
    (-1i64).encode(&mut buf)?; // producer id
    (-1i16).encode(&mut buf)?; // producer epoch
    (-1i32).encode(&mut buf)?; // base sequence
    record_count.encode(&mut buf)?;

    for record in records {
        encode_record(&mut buf, record)?;
    }

    let batch_length = i32::try_from(buf.len() - LOG_OVERHEAD)
        .map_err(|_| Error::EncodingError("record batch larger than i32::MAX"))?;
    batch_length.encode(&mut &mut buf[LENGTH_OFFSET..LOG_OVERHEAD])?;

    let crc = to_crc32c(&buf[ATTRIBUTES_OFFSET..]);
    crc.encode(&mut &mut buf[CRC_OFFSET..ATTRIBUTES_OFFSET])?;

    Ok(buf)
}

fn encode_record(buffer: &mut Vec<u8>, record: &Record) -> Result<()> {
    let mut body = Vec::new();
    record.attributes.encode(&mut body)?;
    encode_varint(&mut body, record.timestamp_delta);
    encode_varint(&mut body, record.offset_delta);
    encode_varint_bytes(&mut body, record.key.as_deref());
    encode_varint_bytes(&mut body, record.value.as_deref());
    encode_varint(&mut body, record.headers.len() as i64);
    for header in &record.headers {
        encode_varint_bytes(&mut body, Some(&header.key[..]));
        encode_varint_bytes(&mut body, header.value.as_deref());
    }

    encode_varint(buffer, body.len() as i64);
    buffer.extend_from_slice(&body);
    Ok(())
}

/// Split the records field of a fetched partition into batches.
///
/// Every complete batch has its checksum verified. The broker may cut
/// the last batch short to honour the fetch size limits, that partial
/// batch is dropped and fetched again on the next request.
pub fn decode_record_batches(mut records: Bytes) -> Result<Vec<RecordBatch>> {
    let mut batches = vec![];
    while records.len() >= LOG_OVERHEAD {
        let batch_length = (&records[LENGTH_OFFSET..LOG_OVERHEAD]).get_i32();
        if batch_length < 0 {
            return Err(Error::protocol(format!(
                "negative record batch length {}",
                batch_length
            )));
        }
        let size = LOG_OVERHEAD + batch_length as usize;
        if records.len() < size {
            tracing::trace!(
                "Dropping partial record batch, {} of {} bytes",
                records.len(),
                size
            );
            break;
        }

        let batch = records.split_to(size);
        if batch.len() < BATCH_HEADER_SIZE {
            return Err(Error::protocol(format!(
                "record batch of {} bytes is shorter than its header",
                batch.len()
            )));
        }
        let magic = batch[MAGIC_OFFSET] as i8;
        if magic != MAGIC {
            return Err(Error::protocol(format!(
                "unsupported record batch magic {}",
                magic
            )));
        }
        let expected = (&batch[CRC_OFFSET..ATTRIBUTES_OFFSET]).get_u32();
        let actual = to_crc32c(&batch[ATTRIBUTES_OFFSET..]);
        if expected != actual {
            tracing::error!(
                "ERROR: Record batch crc mismatch, expected {:#010x} got {:#010x}",
                expected,
                actual
            );
            return Err(Error::CorruptFrame { expected, actual });
        }
        let attributes = (&batch[ATTRIBUTES_OFFSET..ATTRIBUTES_OFFSET + 2]).get_i16();
        let batch = match attributes & COMPRESSION_MASK {
            0 => batch,
            GZIP => {
                tracing::debug!("Decompressing with GZIP");
                // header stays as is, only the records after the count are compressed
                let mut plain = batch[..BATCH_HEADER_SIZE].to_vec();
                plain.extend_from_slice(&uncompress(&batch[BATCH_HEADER_SIZE..])?);
                Bytes::from(plain)
            }
            codec => return Err(Error::UnsupportedCompression { codec }),
        };

        let (_, parsed) = parse_record_batch(NomBytes::new(batch.clone()))
            .map_err(|err| crate::protocol::parse_failure("RecordBatch", err, &batch))?;
        parsed.next_offset()?;
        batches.push(parsed);
    }
    Ok(batches)
}

pub fn parse_record_batch(s: NomBytes) -> IResult<NomBytes, RecordBatch> {
    let (s, base_offset) = be_i64(s)?;
    let (s, batch_length) = be_i32(s)?;
    let (s, partition_leader_epoch) = be_i32(s)?;
    let (s, magic) = be_i8(s)?;
    let (s, crc) = be_u32(s)?;
    let (s, attributes) = be_i16(s)?;
    let (s, last_offset_delta) = be_i32(s)?;
    let (s, base_timestamp) = be_i64(s)?;
    let (s, max_timestamp) = be_i64(s)?;
    let (s, producer_id) = be_i64(s)?;
    let (s, producer_epoch) = be_i16(s)?;
    let (s, base_sequence) = be_i32(s)?;
    let (s, records) = parser::parse_array(parse_record)(s)?;

    Ok((
        s,
        RecordBatch {
            base_offset,
            batch_length,
            partition_leader_epoch,
            magic,
            crc,
            attributes,
            last_offset_delta,
            base_timestamp,
            max_timestamp,
            producer_id,
            producer_epoch,
            base_sequence,
            records,
        },
    ))
}

fn parse_record(s: NomBytes) -> IResult<NomBytes, Record> {
    let (s, length) = parser::take_varint(s)?;
    let (rest, body) = take(length.max(0) as usize)(s)?;

    let (body, attributes) = be_i8(body)?;
    let (body, timestamp_delta) = parser::take_varint(body)?;
    let (body, offset_delta) = parser::take_varint(body)?;
    let (body, key) = parser::parse_varint_bytes(body)?;
    let (body, value) = parser::parse_varint_bytes(body)?;
    let (_, headers) = parser::parse_varint_array(parse_header)(body)?;

    Ok((
        rest,
        Record {
            attributes,
            timestamp_delta,
            offset_delta,
            key,
            value,
            headers,
        },
    ))
}

fn parse_header(s: NomBytes) -> IResult<NomBytes, Header> {
    let (s, key) = parser::parse_varint_bytes(s)?;
    let (s, value) = parser::parse_varint_bytes(s)?;

    Ok((
        s,
        Header {
            key: key.unwrap_or_default(),
            value,
        },
    ))
}
