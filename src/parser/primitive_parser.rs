use encoding_rs::WINDOWS_1252;
use nom::error::{Error, ErrorKind};
use nom::{bytes, number, IResult};

/// Maximum number of bytes in a MIDI variable length quantity
pub const MAX_VLQ_BYTES: usize = 4;

/// Parse unsigned byte
pub fn parse_u8(i: &[u8]) -> IResult<&[u8], u8> {
    number::complete::u8(i)
}

/// Parse big endian unsigned 16
pub fn parse_u16_be(i: &[u8]) -> IResult<&[u8], u16> {
    number::complete::be_u16(i)
}

/// Parse big endian signed 16
pub fn parse_i16_be(i: &[u8]) -> IResult<&[u8], i16> {
    number::complete::be_i16(i)
}

/// Parse big endian unsigned 24, widened to 32 bits
pub fn parse_u24_be(i: &[u8]) -> IResult<&[u8], u32> {
    number::complete::be_u24(i)
}

/// Parse little endian unsigned 24, widened to 32 bits
pub fn parse_u24_le(i: &[u8]) -> IResult<&[u8], u32> {
    number::complete::le_u24(i)
}

/// Parse big endian unsigned 32
pub fn parse_u32_be(i: &[u8]) -> IResult<&[u8], u32> {
    number::complete::be_u32(i)
}

/// Parse little endian unsigned 16
pub fn parse_u16_le(i: &[u8]) -> IResult<&[u8], u16> {
    number::complete::le_u16(i)
}

/// Parse little endian signed 16
pub fn parse_i16_le(i: &[u8]) -> IResult<&[u8], i16> {
    number::complete::le_i16(i)
}

/// Parse little endian unsigned 32
pub fn parse_u32_le(i: &[u8]) -> IResult<&[u8], u32> {
    number::complete::le_u32(i)
}

/// Parse little endian signed 32
pub fn parse_i32_le(i: &[u8]) -> IResult<&[u8], i32> {
    number::complete::le_i32(i)
}

/// Parse little endian unsigned 64
pub fn parse_u64_le(i: &[u8]) -> IResult<&[u8], u64> {
    number::complete::le_u64(i)
}

/// Parse little endian signed 64
pub fn parse_i64_le(i: &[u8]) -> IResult<&[u8], i64> {
    number::complete::le_i64(i)
}

/// Parse little endian f32
pub fn parse_f32_le(i: &[u8]) -> IResult<&[u8], f32> {
    number::complete::le_f32(i)
}

/// Parse little endian f64
pub fn parse_f64_le(i: &[u8]) -> IResult<&[u8], f64> {
    number::complete::le_f64(i)
}

/// Take exactly `n` bytes.
pub fn take_bytes(n: usize) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |i: &[u8]| bytes::complete::take(n)(i)
}

/// Parse a four byte chunk tag
pub fn parse_tag(i: &[u8]) -> IResult<&[u8], [u8; 4]> {
    let (rest, tag) = bytes::complete::take(4usize)(i)?;
    Ok((rest, [tag[0], tag[1], tag[2], tag[3]]))
}

/// Variable length quantity: big endian base-128, high bit flags continuation.
///
/// Fails with `ErrorKind::TooLarge` when more than four bytes carry the continuation bit
/// and with `ErrorKind::Eof` when the input ends mid-quantity.
pub fn parse_vlq(i: &[u8]) -> IResult<&[u8], u32> {
    let mut value = 0u32;
    for (index, &byte) in i.iter().enumerate() {
        if index == MAX_VLQ_BYTES {
            return Err(nom::Err::Failure(Error::new(i, ErrorKind::TooLarge)));
        }
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((&i[index + 1..], value));
        }
    }
    if i.len() >= MAX_VLQ_BYTES {
        return Err(nom::Err::Failure(Error::new(i, ErrorKind::TooLarge)));
    }
    Err(nom::Err::Error(Error::new(i, ErrorKind::Eof)))
}

/// 7-bit encoded length (LEB128, little endian groups), at most five bytes.
pub fn parse_leb_length(i: &[u8]) -> IResult<&[u8], u32> {
    let mut value = 0u32;
    for (index, &byte) in i.iter().enumerate().take(5) {
        value |= u32::from(byte & 0x7F) << (7 * index);
        if byte & 0x80 == 0 {
            return Ok((&i[index + 1..], value));
        }
    }
    if i.len() >= 5 {
        return Err(nom::Err::Failure(Error::new(i, ErrorKind::TooLarge)));
    }
    Err(nom::Err::Error(Error::new(i, ErrorKind::Eof)))
}

/// Materialize properly encoded String
pub fn make_string(i: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(i) {
        if s.is_ascii() {
            return s.to_string();
        }
    }
    let (cow, encoding_used, had_errors) = WINDOWS_1252.decode(i);
    if had_errors {
        log::debug!("Error parsing string with {encoding_used:?}");
        String::from_utf8_lossy(i).into_owned()
    } else {
        cow.into_owned()
    }
}

/// Decode a NUL padded fixed-size field, stopping at the first NUL.
pub fn make_nul_terminated_string(i: &[u8]) -> String {
    let end = i.iter().position(|&b| b == 0).unwrap_or(i.len());
    let field = &i[..end];
    match std::str::from_utf8(field) {
        Ok(s) => s.to_string(),
        Err(e) => {
            log::debug!("Error UTF-8 string parsing:{e}");
            make_string(field)
        }
    }
}
