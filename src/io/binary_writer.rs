//! Producer side of the binary stream format read by
//! [`BinaryReader`](super::binary_reader::BinaryReader).

use crate::io::binary_reader::datetime_to_ticks;
use chrono::NaiveDateTime;

#[derive(Debug, Default)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buffer.push(u8::from(value));
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_leb_length(&mut self, mut value: usize) {
        while value >= 0x80 {
            self.buffer.push((value as u8 & 0x7F) | 0x80);
            value >>= 7;
        }
        self.buffer.push(value as u8);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_leb_length(value.len());
        self.buffer.extend_from_slice(value.as_bytes());
    }

    pub fn write_datetime(&mut self, time: &NaiveDateTime) {
        self.write_i64(datetime_to_ticks(time));
    }

    /// Writes the body produced by `body` behind an `i32` length prefix.
    pub fn write_section(&mut self, body: impl FnOnce(&mut BinaryWriter)) {
        let mut section = BinaryWriter::new();
        body(&mut section);
        let length = i32::try_from(section.len()).expect("section larger than 2 GiB");
        self.write_i32(length);
        self.buffer.extend_from_slice(&section.buffer);
    }
}
