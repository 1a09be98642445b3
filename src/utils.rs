use std::{
    io::Read,
    time::{SystemTime, UNIX_EPOCH},
};

use crc::{Crc, CRC_32_ISCSI};
use flate2::read::GzDecoder;

use crate::error::{Error, Result};

/// Record batches (magic 2) are checksummed with CRC-32C.
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Milliseconds since the unix epoch, as record timestamps want them.
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

pub fn to_crc32c(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

pub fn uncompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain).map_err(|err| {
        tracing::error!("ERROR: Could not gunzip record batch {:?}", err);
        Error::protocol(format!("invalid gzip records: {}", err))
    })?;
    Ok(plain)
}
