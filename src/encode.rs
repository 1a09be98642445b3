//! Serialize data into the bytecode protocol.
//!
//! All numeric fields are written big-endian, matching the wire order of
//! the Kafka protocol.
use bytes::{BufMut, Bytes};

use crate::error::{Error, Result};

// Helper macro to safely convert an usize expression into a signed
// integer.  If the conversion is not possible the macro issues an
// `EncodingError`, otherwise returns the expression
// in the requested target type.
macro_rules! try_usize_to_int {
    ($value:expr, $ttype:ident, $what:expr) => {{
        let maxv = $ttype::MAX;
        let x: usize = $value;
        if (x as u64) <= (maxv as u64) {
            x as $ttype
        } else {
            return Err(Error::EncodingError($what));
        }
    }};
}

pub trait ToByte {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()>;
}

impl<'a, T: ToByte + 'a + ?Sized> ToByte for &'a T {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        (*self).encode(buffer)
    }
}

impl ToByte for bool {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self as i8);
        Ok(())
    }
}

impl ToByte for i8 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i8(*self);
        Ok(())
    }
}

impl ToByte for i16 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i16(*self);
        Ok(())
    }
}

impl ToByte for i32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i32(*self);
        Ok(())
    }
}

impl ToByte for u32 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_u32(*self);
        Ok(())
    }
}

impl ToByte for i64 {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        buffer.put_i64(*self);
        Ok(())
    }
}

impl ToByte for str {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let l = try_usize_to_int!(self.len(), i16, "string longer than i16::MAX");
        buffer.put_i16(l);
        buffer.put(self.as_bytes());
        Ok(())
    }
}

impl ToByte for String {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        self.as_str().encode(buffer)
    }
}

impl<V: ToByte> ToByte for [V] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        encode_as_array(buffer, self, |buffer, x| x.encode(buffer))
    }
}

impl ToByte for [u8] {
    fn encode<T: BufMut>(&self, buffer: &mut T) -> Result<()> {
        let l = try_usize_to_int!(self.len(), i32, "bytes longer than i32::MAX");
        buffer.put_i32(l);
        buffer.put(self);
        Ok(())
    }
}

// ~ this allows to render a slice of various types (typically &str
// and String) as strings
pub struct AsStrings<'a, T>(pub &'a [T]);

impl<'a, T: AsRef<str> + 'a> ToByte for AsStrings<'a, T> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        encode_as_array(buffer, self.0, |buffer, x| x.as_ref().encode(buffer))
    }
}

/// ~ Renders the length of `xs` to `buffer` as the start of a
/// protocol array and then for each element of `xs` invokes `f`
/// assuming that function will render the element to the buffer.
pub fn encode_as_array<T, F, W>(buffer: &mut W, xs: &[T], mut f: F) -> Result<()>
where
    F: FnMut(&mut W, &T) -> Result<()>,
    W: BufMut,
{
    let l = try_usize_to_int!(xs.len(), i32, "array longer than i32::MAX");
    buffer.put_i32(l);
    for x in xs {
        f(buffer, x)?;
    }
    Ok(())
}

impl<'a> ToByte for Option<&'a [u8]> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(xs) => xs.encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

impl ToByte for Option<Bytes> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match self {
            Some(xs) => xs[..].encode(buffer),
            None => (-1i32).encode(buffer),
        }
    }
}

// nullable strings use an INT16 length, -1 for null
impl<'a> ToByte for Option<&'a str> {
    fn encode<W: BufMut>(&self, buffer: &mut W) -> Result<()> {
        match *self {
            Some(xs) => xs.encode(buffer),
            None => (-1i16).encode(buffer),
        }
    }
}

/// Write a zig-zag encoded variable length integer, as used inside
/// record batches.
pub fn encode_varint<W: BufMut>(buffer: &mut W, value: i64) {
    let mut v = ((value << 1) ^ (value >> 63)) as u64;
    while v >= 0x80 {
        buffer.put_u8((v as u8 & 0x7f) | 0x80);
        v >>= 7;
    }
    buffer.put_u8(v as u8);
}

/// Write a varint length followed by the bytes, or `-1` for null.
pub fn encode_varint_bytes<W: BufMut>(buffer: &mut W, bytes: Option<&[u8]>) {
    match bytes {
        Some(b) => {
            encode_varint(buffer, b.len() as i64);
            buffer.put(b);
        }
        None => encode_varint(buffer, -1),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_string_too_long() {
        let s = "a".repeat(i16::MAX as usize + 1);
        let mut buf = Vec::new();
        match s.encode(&mut buf) {
            Err(Error::EncodingError(_)) => {}
            _ => panic!(),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn codec_i16() {
        let mut buf = vec![];
        let orig: i16 = 5;

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [0, 5]);
    }

    #[test]
    fn codec_32() {
        let mut buf = vec![];
        let orig: i32 = 5;

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 5]);
    }

    #[test]
    fn codec_i64() {
        let mut buf = vec![];
        let orig: i64 = 5;

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn codec_string() {
        let mut buf = vec![];
        let orig = "test".to_owned();

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [0, 4, 116, 101, 115, 116]);
    }

    #[test]
    fn codec_null_string() {
        let mut buf = vec![];
        let orig: Option<&str> = None;

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [255, 255]);
    }

    #[test]
    fn codec_null_bytes() {
        let mut buf = vec![];
        let orig: Option<Bytes> = None;

        orig.encode(&mut buf).unwrap();
        assert_eq!(buf, [255, 255, 255, 255]);
    }

    #[test]
    fn codec_as_strings() {
        let orig: Vec<&str> = vec!["abc", "defg"];

        let mut buf = Vec::new();
        AsStrings(&orig).encode(&mut buf).unwrap();
        assert_eq!(
            buf,
            [0, 0, 0, 2, 0, 3, b'a', b'b', b'c', 0, 4, b'd', b'e', b'f', b'g']
        );
    }

    #[test]
    fn varint_zigzag() {
        let mut buf = vec![];
        encode_varint(&mut buf, 0);
        encode_varint(&mut buf, -1);
        encode_varint(&mut buf, 1);
        encode_varint(&mut buf, 63);
        encode_varint(&mut buf, 64);
        encode_varint(&mut buf, 130);
        assert_eq!(buf, [0x00, 0x01, 0x02, 0x7e, 0x80, 0x01, 0x84, 0x02]);
    }

    #[test]
    fn varint_bytes() {
        let mut buf = vec![];
        encode_varint_bytes(&mut buf, Some(&b"abc"[..]));
        encode_varint_bytes(&mut buf, None);
        assert_eq!(buf, [0x06, b'a', b'b', b'c', 0x01]);
    }
}
