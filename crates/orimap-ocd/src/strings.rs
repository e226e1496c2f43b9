//! String decoding for legacy map files
//!
//! Three encodings occur in the wild:
//! - fixed-length Pascal-style strings (one length byte, then data) in the
//!   file's legacy single-byte code page,
//! - length-prefixed UTF-8 strings (newer generations),
//! - zero-terminated byte buffers, where the terminator must be searched
//!   within the declared field width, never beyond it.
//!
//! The single-byte code page is caller-supplied; the default is
//! Windows-1252, which is Latin-1 except for the 0x80..0x9F range.

/// Windows-1252 mapping of the 0x80..0x9F range; `\u{fffd}` for the five
/// unassigned code points
const CP1252_HIGH: [char; 32] = [
    '\u{20ac}', '\u{fffd}', '\u{201a}', '\u{0192}', '\u{201e}', '\u{2026}', '\u{2020}',
    '\u{2021}', '\u{02c6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{fffd}',
    '\u{017d}', '\u{fffd}', '\u{fffd}', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}',
    '\u{2022}', '\u{2013}', '\u{2014}', '\u{02dc}', '\u{2122}', '\u{0161}', '\u{203a}',
    '\u{0153}', '\u{fffd}', '\u{017e}', '\u{0178}',
];

/// Decoder for the file's legacy single-byte string encoding
///
/// Bytes below 0x80 are ASCII and bytes from 0xA0 up follow Latin-1; only
/// the 0x80..0x9F block differs between code pages and is table-driven.
#[derive(Debug, Clone)]
pub struct LegacyCodec {
    high: [char; 32],
}

impl LegacyCodec {
    /// Windows-1252, the de-facto default of legacy map files
    pub fn windows_1252() -> Self {
        Self { high: CP1252_HIGH }
    }

    /// Plain ISO 8859-1
    pub fn latin1() -> Self {
        let mut high = ['\0'; 32];
        for (i, slot) in high.iter_mut().enumerate() {
            *slot = char::from(0x80 + i as u8);
        }
        Self { high }
    }

    /// Custom code page given as the mapping of the 0x80..0x9F block
    pub fn from_table(high: [char; 32]) -> Self {
        Self { high }
    }

    /// Decode a raw byte run
    pub fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| match b {
                0x80..=0x9F => self.high[(b - 0x80) as usize],
                _ => char::from(b),
            })
            .collect()
    }

    /// Decode a Pascal-style string: one length byte, then data.
    ///
    /// The length is capped at the buffer size; a corrupt prefix cannot
    /// read past the field.
    pub fn decode_pascal(&self, buf: &[u8]) -> String {
        let Some((&len, data)) = buf.split_first() else {
            return String::new();
        };
        let len = (len as usize).min(data.len());
        self.decode(&data[..len])
    }

    /// Decode a zero-terminated string, scanning for the terminator only
    /// within the declared buffer
    pub fn decode_terminated(&self, buf: &[u8]) -> String {
        self.decode(clip_terminated(buf))
    }
}

impl Default for LegacyCodec {
    fn default() -> Self {
        Self::windows_1252()
    }
}

/// Decode a length-prefixed UTF-8 string, length capped at the buffer
pub fn decode_pascal_utf8(buf: &[u8]) -> String {
    let Some((&len, data)) = buf.split_first() else {
        return String::new();
    };
    let len = (len as usize).min(data.len());
    String::from_utf8_lossy(&data[..len]).into_owned()
}

/// Decode a zero-terminated UTF-8 string within the declared buffer
pub fn decode_terminated_utf8(buf: &[u8]) -> String {
    String::from_utf8_lossy(clip_terminated(buf)).into_owned()
}

/// The prefix of `buf` up to (not including) the first zero byte
fn clip_terminated(buf: &[u8]) -> &[u8] {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..len]
}
