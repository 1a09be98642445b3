//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    bytes::complete::take,
    combinator::map,
    error::{ErrorKind, ParseError},
    multi::many_m_n,
    number::complete::{be_i16, be_i32, be_u8},
    IResult, InputLength,
};
use nombytes::NomBytes;
use num_traits::FromPrimitive;

use crate::error::KafkaCode;

pub fn parse_kafka_code(s: NomBytes) -> IResult<NomBytes, KafkaCode> {
    map(be_i16, |n| {
        FromPrimitive::from_i16(n).unwrap_or(KafkaCode::Unknown)
    })(s)
}

/// Zig-zag decoded variable length integer (varint and varlong share
/// the encoding).
pub fn take_varint(s: NomBytes) -> IResult<NomBytes, i64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    let mut remainder = s;
    loop {
        let (rest, byte) = be_u8(remainder)?;
        remainder = rest;
        if shift > 63 {
            return Err(nom::Err::Error(nom::error::Error::from_error_kind(
                remainder,
                ErrorKind::TooLarge,
            )));
        }
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
    }
    Ok((remainder, ((value >> 1) as i64) ^ -((value & 1) as i64)))
}

/// Bytes prefixed by a varint length, where `-1` means null.
pub fn parse_varint_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = take_varint(s)?;
    if length < 0 {
        return Ok((s, None));
    }
    let (s, bytes) = take(length as usize)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i16(s)?;
    let (s, string) = take(length.max(0) as usize)(s)?;
    Ok((s, string.into_bytes()))
}

pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, string) = take(length.max(0) as usize)(s)?;
    Ok((s, Some(string.into_bytes())))
}

pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;
    if length == -1 {
        return Ok((s, None));
    }

    let (s, bytes) = take(length.max(0) as usize)(s)?;
    Ok((s, Some(bytes.into_bytes())))
}

fn counted<O, E, F>(i: NomBytes, length: i64, f: F) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E>,
    E: ParseError<NomBytes>,
{
    if length <= 0 {
        return Ok((i, vec![]));
    }
    // every element takes at least one byte
    if length as usize > i.input_len() {
        return Err(nom::Err::Error(E::from_error_kind(i, ErrorKind::Count)));
    }
    let length = length as usize;
    many_m_n(length, length, f)(i)
}

pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let (i, length) = be_i32(input)?;
        counted(i, length as i64, f)
    }
}

/// Arrays inside record batches carry a varint count.
pub fn parse_varint_array<O, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>>
where
    F: nom::Parser<NomBytes, O, nom::error::Error<NomBytes>> + Copy,
{
    move |input: NomBytes| {
        let (i, length) = take_varint(input)?;
        counted(i, length, f)
    }
}
