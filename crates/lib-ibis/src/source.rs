//! Where parser input comes from.
//!
//! Parsers work on `&str`; a [`TextSource`] supplies that text for a path so
//! callers can swap the file system for an in-memory map in tests.

use crate::ami_parser::{parse_ami_file, AmiFile};
use crate::error::{ParseError, ParseResult};
use crate::ibs_parser::{parse_ibs_file, IbisFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Supplies raw file contents for a path.
pub trait TextSource {
    fn read_text(&self, path: &Path) -> ParseResult<String>;
}

/// Reads from the file system. Invalid UTF-8 is replaced rather than
/// rejected, since vendor files are often Latin-1.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsSource;

impl TextSource for FsSource {
    fn read_text(&self, path: &Path) -> ParseResult<String> {
        let bytes =
            std::fs::read(path).map_err(|e| ParseError::io(path.display().to_string(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// In-memory files keyed by path.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a file.
    pub fn with_file(mut self, path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }
}

impl TextSource for MemorySource {
    fn read_text(&self, path: &Path) -> ParseResult<String> {
        self.files.get(path).cloned().ok_or_else(|| {
            ParseError::io(
                path.display().to_string(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            )
        })
    }
}

/// Read and parse a model-description file.
pub fn parse_ibs_path(source: &dyn TextSource, path: &Path) -> ParseResult<IbisFile> {
    tracing::debug!(path = %path.display(), "Reading IBIS file");
    parse_ibs_file(&source.read_text(path)?)
}

/// Read and parse a parameter file.
pub fn parse_ami_path(source: &dyn TextSource, path: &Path) -> ParseResult<AmiFile> {
    tracing::debug!(path = %path.display(), "Reading AMI file");
    parse_ami_file(&source.read_text(path)?)
}
