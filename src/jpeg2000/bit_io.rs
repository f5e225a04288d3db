//! Bit-level I/O for packet headers.
//!
//! Packet headers are written MSB first with bit stuffing (B.10.1): after a byte
//! equal to 0xFF the next byte only carries seven bits and its MSB is zero, so no
//! marker code can appear inside a header. Packet bodies and markers are plain
//! bytes and are written once the stream is byte aligned.

use crate::error::T2Error;

pub struct J2kBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buffer: u8,
    bits_left: u8,
    last_byte: u8,
}

impl<'a> J2kBitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buffer: 0,
            bits_left: 0,
            last_byte: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<u8, T2Error> {
        if self.bits_left == 0 {
            let b = *self.data.get(self.pos).ok_or(T2Error::EndOfStream)?;
            self.pos += 1;
            // A byte following 0xFF holds a stuffed zero in its MSB.
            self.bits_left = if self.last_byte == 0xFF { 7 } else { 8 };
            self.bit_buffer = b;
            self.last_byte = b;
        }

        let bit = (self.bit_buffer >> (self.bits_left - 1)) & 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    pub fn read_bits(&mut self, count: u32) -> Result<u32, T2Error> {
        debug_assert!(count <= 32);
        let mut bits = 0u32;
        for _ in 0..count {
            bits = (bits << 1) | self.read_bit()? as u32;
        }
        Ok(bits)
    }

    /// Skip to the next byte boundary at the end of a packet header.
    pub fn align(&mut self) -> Result<(), T2Error> {
        self.bits_left = 0;
        if self.last_byte == 0xFF {
            if self.pos >= self.data.len() {
                return Err(T2Error::EndOfStream);
            }
            self.pos += 1;
        }
        self.last_byte = 0;
        Ok(())
    }

    fn is_aligned(&self) -> bool {
        self.bits_left == 0 && self.last_byte == 0
    }

    pub fn peek_u16(&self) -> Option<u16> {
        debug_assert!(self.is_aligned());
        let bytes = self.data.get(self.pos..self.pos + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u16(&mut self) -> Result<u16, T2Error> {
        let value = self.peek_u16().ok_or(T2Error::EndOfStream)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], T2Error> {
        debug_assert!(self.is_aligned());
        let end = self.pos.checked_add(count).ok_or(T2Error::EndOfStream)?;
        let bytes = self.data.get(self.pos..end).ok_or(T2Error::EndOfStream)?;
        self.pos = end;
        Ok(bytes)
    }

    pub fn has_data(&self) -> bool {
        self.pos < self.data.len() || self.bits_left > 0
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

#[derive(Debug, Default)]
pub struct J2kBitWriter {
    data: Vec<u8>,
    bit_buffer: u8,
    bits_count: u8,
    last_byte: u8,
    limit: Option<usize>,
}

impl J2kBitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A writer that fails with `EndOfStream` once `limit` bytes have been produced.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn byte_capacity(&self) -> u8 {
        if self.last_byte == 0xFF { 7 } else { 8 }
    }

    fn push_byte(&mut self, b: u8) -> Result<(), T2Error> {
        if self.limit.is_some_and(|limit| self.data.len() >= limit) {
            return Err(T2Error::EndOfStream);
        }
        self.data
            .try_reserve(1)
            .map_err(|_| T2Error::NotEnoughMemory)?;
        self.data.push(b);
        Ok(())
    }

    pub fn write_bit(&mut self, bit: u8) -> Result<(), T2Error> {
        self.bit_buffer = (self.bit_buffer << 1) | (bit & 1);
        self.bits_count += 1;
        if self.bits_count == self.byte_capacity() {
            self.flush_byte()?;
        }
        Ok(())
    }

    pub fn write_bits(&mut self, value: u32, count: u32) -> Result<(), T2Error> {
        debug_assert!(count <= 32);
        for i in (0..count).rev() {
            self.write_bit(((value >> i) & 1) as u8)?;
        }
        Ok(())
    }

    fn flush_byte(&mut self) -> Result<(), T2Error> {
        let b = self.bit_buffer;
        self.push_byte(b)?;
        self.last_byte = b;
        self.bit_buffer = 0;
        self.bits_count = 0;
        Ok(())
    }

    /// Pad the current packet header to a byte boundary with zero bits.
    ///
    /// A header never ends with 0xFF: the stuffed byte that must follow it is emitted here.
    pub fn align(&mut self) -> Result<(), T2Error> {
        if self.bits_count > 0 {
            self.bit_buffer <<= self.byte_capacity() - self.bits_count;
            self.flush_byte()?;
        } else if self.last_byte == 0xFF {
            self.push_byte(0)?;
        }
        self.last_byte = 0;
        Ok(())
    }

    fn is_aligned(&self) -> bool {
        self.bits_count == 0 && self.last_byte == 0
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), T2Error> {
        debug_assert!(self.is_aligned());
        if let Some(limit) = self.limit {
            if self.data.len() + bytes.len() > limit {
                return Err(T2Error::EndOfStream);
            }
        }
        self.data
            .try_reserve(bytes.len())
            .map_err(|_| T2Error::NotEnoughMemory)?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), T2Error> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Bytes written so far; a partially filled byte is not counted.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn finish(mut self) -> Result<Vec<u8>, T2Error> {
        self.align()?;
        Ok(self.data)
    }

    pub fn get_output(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stuffing_after_ff() {
        let mut writer = J2kBitWriter::new();
        writer.write_bits(0xFF, 8).unwrap();
        // Only seven bits fit in the byte after 0xFF.
        writer.write_bits(0x7F, 7).unwrap();
        writer.write_bit(1).unwrap();
        let data = writer.finish().unwrap();
        assert_eq!(data, vec![0xFF, 0x7F, 0x80]);

        let mut reader = J2kBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.read_bits(7).unwrap(), 0x7F);
        assert_eq!(reader.read_bit().unwrap(), 1);
    }

    #[test]
    fn test_align_after_ff_emits_stuffed_byte() {
        let mut writer = J2kBitWriter::new();
        writer.write_bits(0xFF, 8).unwrap();
        writer.align().unwrap();
        writer.write_bytes(&[0xAB]).unwrap();
        let data = writer.finish().unwrap();
        assert_eq!(data, vec![0xFF, 0x00, 0xAB]);

        let mut reader = J2kBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        reader.align().unwrap();
        assert_eq!(reader.read_bytes(1).unwrap(), &[0xAB]);
        assert!(!reader.has_data());
    }

    #[test]
    fn test_partial_byte_padding() {
        let mut writer = J2kBitWriter::new();
        writer.write_bits(0b101, 3).unwrap();
        writer.align().unwrap();
        writer.write_u16(0xFF92).unwrap();
        assert_eq!(writer.get_output(), &[0b1010_0000, 0xFF, 0x92]);
    }

    #[test]
    fn test_reader_end_of_stream() {
        let data = [0x80];
        let mut reader = J2kBitReader::new(&data);
        assert_eq!(reader.read_bits(8).unwrap(), 0x80);
        assert_eq!(reader.read_bit(), Err(T2Error::EndOfStream));
        reader.align().unwrap();
        assert_eq!(reader.read_u16(), Err(T2Error::EndOfStream));
        assert_eq!(reader.read_bytes(1), Err(T2Error::EndOfStream));
    }

    #[test]
    fn test_writer_limit() {
        let mut writer = J2kBitWriter::with_limit(1);
        writer.write_bits(0xA5, 8).unwrap();
        assert_eq!(writer.write_bits(0xFF, 8), Err(T2Error::EndOfStream));
    }
}
