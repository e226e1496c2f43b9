//! Format version detection and per-generation record layouts
//!
//! The first bytes of the file carry a magic marker and a version number.
//! The version selects one of a fixed set of record layouts; all layout
//! differences (string encoding, name field widths, where colors live) are
//! captured in an immutable [`Layout`] value so that the decoders stay
//! generic over the generation. An unknown version is the one fatal decode
//! error: without a layout nothing can be read.

use crate::reader::ByteReader;
use crate::{OcdError, Result};

/// Magic marker at offset 0
pub const MAGIC: u16 = 0x0CAD;
/// Fixed header length in bytes
pub const HEADER_LEN: usize = 16;
/// Fixed table-of-contents entry length in bytes
pub const TOC_ENTRY_LEN: usize = 16;

/// Format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Version 8: legacy single-byte strings, binary color section
    V8,
    /// Versions 9-11: UTF-8 strings, colors as parameter strings
    V9,
}

/// Immutable record layout of one format generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub version: FormatVersion,
    /// Declared version number from the header
    pub version_number: u16,
    /// Strings are UTF-8 rather than legacy single-byte encoded
    pub utf8_strings: bool,
    /// Width of the symbol name field, including the length prefix
    pub symbol_name_len: usize,
    /// Colors are carried as type-9 parameter strings instead of a
    /// binary color section
    pub colors_in_parameter_strings: bool,
}

impl Layout {
    /// Select the layout for a declared version number
    pub fn for_version(version: u16) -> Result<Layout> {
        match version {
            8 => Ok(Layout {
                version: FormatVersion::V8,
                version_number: version,
                utf8_strings: false,
                symbol_name_len: 32,
                colors_in_parameter_strings: false,
            }),
            9..=11 => Ok(Layout {
                version: FormatVersion::V9,
                version_number: version,
                utf8_strings: true,
                symbol_name_len: 64,
                colors_in_parameter_strings: true,
            }),
            version => Err(OcdError::UnsupportedVersion { version }),
        }
    }
}

/// Decoded file header
#[derive(Debug, Clone, Copy)]
pub struct FileHeader {
    pub version: u16,
    pub subversion: u16,
    pub toc_offset: u32,
    pub toc_count: u32,
}

impl FileHeader {
    /// Parse the fixed-size header at the start of the stream.
    ///
    /// A wrong magic or truncated header is fatal: the table of contents
    /// is mandatory for everything else.
    pub fn parse(data: &[u8]) -> Result<FileHeader> {
        let mut reader = ByteReader::new(data, "header");
        let magic = reader.read_u16()?;
        if magic != MAGIC {
            return Err(OcdError::InvalidHeader(format!(
                "bad magic 0x{:04X}, expected 0x{:04X}",
                magic, MAGIC
            )));
        }
        let version = reader.read_u16()?;
        let subversion = reader.read_u16()?;
        reader.skip(2)?; // reserved
        let toc_offset = reader.read_u32()?;
        let toc_count = reader.read_u32()?;
        Ok(FileHeader {
            version,
            subversion,
            toc_offset,
            toc_count,
        })
    }
}

/// Section type of a table-of-contents entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Colors,
    Symbols,
    Objects,
    Strings,
    Unknown(u16),
}

impl From<u16> for SectionType {
    fn from(value: u16) -> Self {
        match value {
            1 => SectionType::Colors,
            2 => SectionType::Symbols,
            3 => SectionType::Objects,
            4 => SectionType::Strings,
            other => SectionType::Unknown(other),
        }
    }
}

/// One table-of-contents entry
#[derive(Debug, Clone, Copy)]
pub struct TocEntry {
    pub section: SectionType,
    pub offset: u32,
    pub count: u32,
    pub extra: u32,
}

impl TocEntry {
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<TocEntry> {
        let section = SectionType::from(reader.read_u16()?);
        reader.skip(2)?; // reserved
        let offset = reader.read_u32()?;
        let count = reader.read_u32()?;
        let extra = reader.read_u32()?;
        Ok(TocEntry {
            section,
            offset,
            count,
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_for_known_versions() {
        let v8 = Layout::for_version(8).unwrap();
        assert_eq!(v8.version, FormatVersion::V8);
        assert!(!v8.utf8_strings);
        assert!(!v8.colors_in_parameter_strings);

        for version in 9..=11 {
            let layout = Layout::for_version(version).unwrap();
            assert_eq!(layout.version, FormatVersion::V9);
            assert!(layout.utf8_strings);
            assert!(layout.colors_in_parameter_strings);
        }
    }

    #[test]
    fn test_layout_rejects_unknown_versions() {
        for version in [0, 7, 12, 255] {
            match Layout::for_version(version) {
                Err(OcdError::UnsupportedVersion { version: v }) => assert_eq!(v, version),
                other => panic!("expected UnsupportedVersion, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_header_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&MAGIC.to_le_bytes());
        data.extend_from_slice(&9u16.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&3u32.to_le_bytes());

        let header = FileHeader::parse(&data).unwrap();
        assert_eq!(header.version, 9);
        assert_eq!(header.subversion, 2);
        assert_eq!(header.toc_offset, 16);
        assert_eq!(header.toc_count, 3);
    }

    #[test]
    fn test_header_bad_magic() {
        let data = [0u8; HEADER_LEN];
        assert!(matches!(
            FileHeader::parse(&data),
            Err(OcdError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_header_truncated() {
        let data = [0xAD, 0x0C, 0x08];
        assert!(matches!(
            FileHeader::parse(&data),
            Err(OcdError::UnexpectedEof { .. })
        ));
    }
}
