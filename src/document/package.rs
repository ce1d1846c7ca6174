//! The zip container around a word-processing document.
//!
//! Only the main document part and the footnotes part are ever interpreted;
//! every other part (styles, settings, relationships, media…) is passed
//! through byte-for-byte on repackaging so the output stays a valid package
//! without this crate modelling the whole OOXML surface.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::AnchorDocError;

/// Part name of the main document body.
pub const DOCUMENT_PART: &str = "word/document.xml";
/// Part name of the footnotes table.
pub const FOOTNOTES_PART: &str = "word/footnotes.xml";

/// An opened package: all parts held in memory, in archive order.
pub struct DocxPackage {
    parts: Vec<(String, Vec<u8>)>,
}

impl DocxPackage {
    /// Read every part of the package at `path` into memory.
    pub fn open(path: &Path) -> Result<Self, AnchorDocError> {
        if !path.exists() {
            return Err(AnchorDocError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path).map_err(|e| AnchorDocError::InvalidPackage {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let mut archive =
            ZipArchive::new(Cursor::new(bytes)).map_err(|e| AnchorDocError::InvalidPackage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| AnchorDocError::InvalidPackage {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
            if entry.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| AnchorDocError::InvalidPackage {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })?;
            parts.push((entry.name().to_string(), data));
        }
        debug!(parts = parts.len(), path = %path.display(), "opened package");
        Ok(Self { parts })
    }

    /// A package built from raw parts. Used by tests and by callers that
    /// assemble documents from scratch.
    pub fn from_parts(parts: Vec<(String, Vec<u8>)>) -> Self {
        Self { parts }
    }

    /// Raw bytes of a part, if present.
    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.as_slice())
    }

    /// The main document part. Its absence makes the package unusable.
    pub fn document_xml(&self) -> Result<&[u8], AnchorDocError> {
        self.part(DOCUMENT_PART)
            .ok_or_else(|| AnchorDocError::MissingPart {
                part: DOCUMENT_PART.to_string(),
            })
    }

    /// The footnotes part. Absence just means no footnotes.
    pub fn footnotes_xml(&self) -> Option<&[u8]> {
        self.part(FOOTNOTES_PART)
    }

    /// Write a copy of this package to `path`, substituting the parts named
    /// in `replacements` and appending any replacement part the original
    /// lacked. All other parts pass through unmodified.
    ///
    /// The file is written to a temporary sibling and renamed into place so
    /// a failure mid-write never leaves a truncated package behind.
    pub fn repackage(
        &self,
        path: &Path,
        replacements: &[(&str, &[u8])],
    ) -> Result<(), AnchorDocError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
            AnchorDocError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e,
            }
        })?;

        let mut writer = ZipWriter::new(tmp);
        let options = SimpleFileOptions::default();
        let write_err = |e: zip::result::ZipError| AnchorDocError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: std::io::Error::other(e),
        };

        let mut written: Vec<&str> = Vec::new();
        for (name, data) in &self.parts {
            let payload = replacements
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, d)| *d)
                .unwrap_or(data.as_slice());
            writer.start_file(name.clone(), options).map_err(write_err)?;
            writer
                .write_all(payload)
                .map_err(|e| AnchorDocError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            written.push(name);
        }
        for (name, data) in replacements {
            if written.iter().any(|n| n == name) {
                continue;
            }
            writer
                .start_file(name.to_string(), options)
                .map_err(write_err)?;
            writer
                .write_all(data)
                .map_err(|e| AnchorDocError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }

        let tmp = writer.finish().map_err(write_err)?;
        tmp.persist(path)
            .map_err(|e| AnchorDocError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: e.error,
            })?;
        debug!(path = %path.display(), "repackaged document");
        Ok(())
    }
}
