//! Reader for length-delimited little endian binary streams such as the song scan cache.
//!
//! Sections are framed by a 32-bit length, so each one can be handed to
//! [`BinaryReader::split_section`] and decoded on its own thread.

use crate::io::byte_cursor::ByteCursor;
use crate::parser::primitive_parser::{
    parse_f32_le, parse_f64_le, parse_i16_le, parse_i32_le, parse_i64_le, parse_leb_length,
    parse_u16_le, parse_u32_le, parse_u64_le, parse_u8, take_bytes,
};
use crate::ScanError;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

/// Mask of the tick count in a binary encoded timestamp (top two bits hold the kind).
const DATETIME_TICKS_MASK: i64 = 0x3FFF_FFFF_FFFF_FFFF;

/// 100ns ticks since 0001-01-01
pub fn datetime_from_ticks(ticks: i64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1, 1, 1)?.and_hms_opt(0, 0, 0)?;
    let seconds = ticks / 10_000_000;
    let nanos = (ticks % 10_000_000) * 100;
    epoch.checked_add_signed(TimeDelta::seconds(seconds) + TimeDelta::nanoseconds(nanos))
}

pub fn datetime_to_ticks(time: &NaiveDateTime) -> i64 {
    let epoch = NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let delta = *time - epoch;
    delta.num_seconds() * 10_000_000 + i64::from(delta.subsec_nanos()) / 100
}

#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    cursor: ByteCursor<'a>,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(data),
        }
    }

    pub const fn position(&self) -> usize {
        self.cursor.position()
    }

    pub const fn is_at_end(&self) -> bool {
        self.cursor.is_at_boundary()
    }

    pub const fn remaining_len(&self) -> usize {
        self.cursor.remaining_len()
    }

    /// Reads a 32-bit version tag; `None` when it is absent or differs from `expected`.
    pub fn read_header(&mut self, expected: u32) -> Option<()> {
        let version = self.read_u32()?;
        if version != expected {
            log::debug!("Binary stream version {version} does not match {expected}");
            return None;
        }
        Some(())
    }

    pub fn read_bool(&mut self) -> Option<bool> {
        self.read_u8().map(|b| b != 0)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.cursor.parse(parse_u8)
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.cursor.parse(parse_i16_le)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.cursor.parse(parse_u16_le)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.cursor.parse(parse_i32_le)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.cursor.parse(parse_u32_le)
    }

    pub fn read_i64(&mut self) -> Option<i64> {
        self.cursor.parse(parse_i64_le)
    }

    pub fn read_u64(&mut self) -> Option<u64> {
        self.cursor.parse(parse_u64_le)
    }

    pub fn read_f32(&mut self) -> Option<f32> {
        self.cursor.parse(parse_f32_le)
    }

    pub fn read_f64(&mut self) -> Option<f64> {
        self.cursor.parse(parse_f64_le)
    }

    pub fn read_leb_length(&mut self) -> Option<usize> {
        self.cursor.parse(parse_leb_length).map(|len| len as usize)
    }

    pub fn read_bytes(&mut self, count: usize) -> Option<&'a [u8]> {
        self.cursor.parse(take_bytes(count))
    }

    /// LEB length prefixed UTF-8 string, borrowed from the buffer.
    pub fn read_str(&mut self) -> Result<&'a str, ScanError> {
        let start = self.position();
        let len = self
            .read_leb_length()
            .ok_or_else(|| ScanError::parsing(format!("missing string length at {start}")))?;
        let bytes = self.read_bytes(len).ok_or_else(|| {
            ScanError::parsing(format!("string of {len} bytes at {start} runs past its section"))
        })?;
        std::str::from_utf8(bytes)
            .map_err(|e| ScanError::parsing(format!("invalid UTF-8 string at {start}: {e}")))
    }

    pub fn read_string(&mut self) -> Result<String, ScanError> {
        self.read_str().map(str::to_string)
    }

    /// 64-bit binary encoded timestamp.
    pub fn read_datetime(&mut self) -> Option<NaiveDateTime> {
        let raw = self.read_i64()?;
        datetime_from_ticks(raw & DATETIME_TICKS_MASK)
    }

    /// Reads an `i32` length and restricts the reader to that many bytes.
    pub fn enter_section(&mut self) -> Result<usize, ScanError> {
        let start = self.position();
        let length = self
            .read_i32()
            .ok_or_else(|| ScanError::parsing(format!("missing section length at {start}")))?;
        let length = usize::try_from(length)
            .map_err(|_| ScanError::parsing(format!("negative section length at {start}")))?;
        self.cursor.enter(length)?;
        Ok(length)
    }

    /// Jumps to the end of the current section, skipping unread bytes.
    ///
    /// Panics when no section is open.
    pub fn exit_section(&mut self) {
        self.cursor.exit();
    }

    /// Detaches the next length-prefixed section as an independent reader.
    pub fn split_section(&mut self) -> Result<BinaryReader<'a>, ScanError> {
        self.enter_section()?;
        let section = BinaryReader::new(self.cursor.remaining());
        self.cursor.exit();
        Ok(section)
    }
}
