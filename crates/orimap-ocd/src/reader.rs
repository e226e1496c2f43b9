//! Bounds-checked little-endian reader over the file's byte buffer
//!
//! Every read checks the remaining length; running off the end yields an
//! [`OcdError::UnexpectedEof`] naming the section being decoded, so a
//! truncated section can be reported without touching sections that were
//! already decoded.

use crate::{OcdError, Result};

/// Sequential reader over a byte slice, little-endian throughout
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Name of the section being decoded, for error messages
    section: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], section: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            section,
        }
    }

    /// Reader starting at `offset` into `data`
    pub fn at_offset(data: &'a [u8], offset: usize, section: &'static str) -> Result<Self> {
        if offset > data.len() {
            return Err(OcdError::UnexpectedEof { section, offset });
        }
        Ok(Self {
            data,
            pos: offset,
            section,
        })
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn eof(&self) -> OcdError {
        OcdError::UnexpectedEof {
            section: self.section,
            offset: self.pos,
        }
    }

    /// Borrow `len` raw bytes and advance
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.eof());
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(self.eof());
        }
        self.pos += len;
        Ok(())
    }

    /// Move to an absolute offset
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(OcdError::UnexpectedEof {
                section: self.section,
                offset,
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let bytes = self.bytes(1)?;
        Ok(bytes[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_little_endian() {
        let data = [0x01, 0x02, 0xAD, 0x0C, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = ByteReader::new(&data, "test");
        assert_eq!(reader.read_u16().unwrap(), 0x0201);
        assert_eq!(reader.read_u16().unwrap(), 0x0CAD);
        assert_eq!(reader.read_i32().unwrap(), -1);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_eof_reports_section_and_offset() {
        let data = [0x01];
        let mut reader = ByteReader::new(&data, "symbols");
        match reader.read_u32() {
            Err(OcdError::UnexpectedEof { section, offset }) => {
                assert_eq!(section, "symbols");
                assert_eq!(offset, 0);
            }
            other => panic!("expected eof, got {:?}", other),
        }
    }

    #[test]
    fn test_seek_and_skip() {
        let data = [0u8; 8];
        let mut reader = ByteReader::new(&data, "test");
        reader.seek(4).unwrap();
        assert_eq!(reader.pos(), 4);
        reader.skip(4).unwrap();
        assert!(reader.skip(1).is_err());
        assert!(reader.seek(9).is_err());
        assert!(ByteReader::at_offset(&data, 9, "test").is_err());
    }
}
