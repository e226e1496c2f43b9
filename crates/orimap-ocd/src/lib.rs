//! OriMap OCD Import - Legacy Binary Map-File Importer
//!
//! This library decodes the legacy versioned binary map format into the
//! [`orimap_map`] model. The format went through several incompatible
//! on-disk generations; a version marker in the header selects the record
//! layout. Decoding is deliberately forgiving: only an unknown format
//! version or a truncated mandatory header aborts the import, everything
//! else degrades to warnings collected in a [`Diagnostics`] sink.
//!
//! # Architecture
//!
//! - **[`reader::ByteReader`]**: Bounds-checked little-endian record reader
//! - **[`version::Layout`]**: Per-generation record layout selection
//! - **[`strings`]**: Legacy 8-bit / UTF-8 string decoding
//! - **[`parameters`]**: The line- and tab-oriented parameter string formats
//! - **[`OcdFileImport`]**: Importer façade with two-pass reference resolution

pub mod parameters;
pub mod reader;
pub mod strings;
pub mod version;

mod importer;

pub use importer::{ImportOutput, OcdFileImport};
pub use strings::LegacyCodec;
pub use version::{FormatVersion, Layout};

/// Error types for the import module
///
/// Only conditions from which no meaningful map can be produced are
/// errors; recoverable anomalies go to [`Diagnostics`] instead.
#[derive(Debug, thiserror::Error)]
pub enum OcdError {
    #[error("Unsupported file format version: {version}")]
    UnsupportedVersion { version: u16 },

    #[error("Invalid file header: {0}")]
    InvalidHeader(String),

    #[error("Unexpected end of data in {section} at offset {offset}")]
    UnexpectedEof {
        section: &'static str,
        offset: usize,
    },

    #[error("{count} combined symbol part reference(s) could not be resolved")]
    UnresolvedParts { count: usize },

    #[error("Map error: {0}")]
    Map(#[from] orimap_map::MapError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OcdError>;

/// Accumulated import diagnostics
///
/// Warnings and errors are collected during the import and surfaced to the
/// user afterwards, never interactively per record. Messages are mirrored
/// to `tracing` as they are added.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_warning(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::warn!("{}", text);
        self.warnings.push(text);
    }

    pub fn add_error(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::error!("{}", text);
        self.errors.push(text);
    }

    #[inline]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    #[inline]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }
}
