//! Function extraction: turn a binary on disk into per-function byte slices.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "rizin-extractor")]
pub mod rizin;
pub mod symbols;

#[cfg(feature = "rizin-extractor")]
pub use rizin::RizinExtractor;
pub use symbols::SymbolExtractor;

/// Bytes of one function as found in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFunction {
    pub name: Option<String>,
    /// File offset of the first byte.
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl ExtractedFunction {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Binary not found at {}", .0.display())]
    MissingBinary(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unsupported or unrecognized object format: {}", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("Extractor backend error for {}: {message}", path.display())]
    Backend { path: PathBuf, message: String },
}

impl ExtractError {
    /// The binary the failure is about.
    pub fn path(&self) -> &Path {
        match self {
            ExtractError::MissingBinary(path) => path,
            ExtractError::Read { path, .. }
            | ExtractError::UnsupportedFormat { path }
            | ExtractError::Backend { path, .. } => path,
        }
    }
}

/// Implemented by anything that can split a binary into functions.
pub trait FunctionExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    /// Every function found, unfiltered, ordered by file offset.
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedFunction>, ExtractError>;
}

/// Keep functions strictly longer than `min_size` bytes.
pub fn filter_candidates(
    functions: Vec<ExtractedFunction>,
    min_size: u64,
) -> Vec<ExtractedFunction> {
    functions.into_iter().filter(|f| f.len() > min_size).collect()
}

/// Registry of extractors; callers select by name.
#[derive(Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Box<dyn FunctionExtractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self { extractors: HashMap::new() }
    }

    /// Registry holding every extractor compiled into this build.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SymbolExtractor);
        #[cfg(feature = "rizin-extractor")]
        registry.register(RizinExtractor::default());
        registry
    }

    pub fn register<E: FunctionExtractor + 'static>(&mut self, extractor: E) -> &mut Self {
        self.extractors.insert(extractor.name().to_string(), Box::new(extractor));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn FunctionExtractor> {
        self.extractors.get(name).map(|e| &**e)
    }

    /// Sorted extractor names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.extractors.keys().cloned().collect();
        keys.sort();
        keys
    }
}

pub(crate) fn read_binary(path: &Path) -> Result<Vec<u8>, ExtractError> {
    if !path.is_file() {
        return Err(ExtractError::MissingBinary(path.to_path_buf()));
    }
    std::fs::read(path).map_err(|source| ExtractError::Read { path: path.to_path_buf(), source })
}

/// A loaded section, in both address and file space.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SectionRange {
    pub addr: u64,
    pub size: u64,
    pub file_offset: u64,
    /// Bytes actually present in the file; may be less than `size`.
    pub file_size: u64,
}

impl SectionRange {
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.addr && addr < self.addr.saturating_add(self.size)
    }

    pub fn end(&self) -> u64 {
        self.addr.saturating_add(self.size)
    }

    /// File range for `len` bytes at `addr`, clipped to the section and the file.
    pub fn file_range(&self, addr: u64, len: u64, file_len: u64) -> Option<(usize, usize)> {
        if !self.contains(addr) {
            return None;
        }
        let in_section = addr - self.addr;
        if in_section >= self.file_size {
            return None;
        }
        let start = self.file_offset.saturating_add(in_section);
        let available = self.file_size - in_section;
        let end = start.saturating_add(len.min(available)).min(file_len);
        if start >= end {
            None
        } else {
            Some((start as usize, end as usize))
        }
    }
}

/// Symbol or analysis hit before it is sliced out of the file.
#[derive(Debug, Clone)]
pub(crate) struct FunctionSpan {
    pub name: Option<String>,
    pub addr: u64,
    pub size: Option<u64>,
    /// Index into the section list when the format records it (ELF).
    pub section: Option<usize>,
}

/// Resolve spans against sections and slice the bytes out of `bytes`.
///
/// Spans are de-duplicated per section by address (first one wins). A span
/// without a size runs to the next span in the same section, or to the section end.
pub(crate) fn slice_functions(
    spans: Vec<FunctionSpan>,
    sections: &[SectionRange],
    bytes: &[u8],
) -> Vec<ExtractedFunction> {
    let mut resolved: Vec<(usize, FunctionSpan)> = spans
        .into_iter()
        .filter_map(|span| {
            let idx = match span.section {
                Some(idx) => idx,
                None => sections.iter().position(|s| s.contains(span.addr))?,
            };
            sections.get(idx).filter(|s| s.contains(span.addr))?;
            Some((idx, span))
        })
        .collect();
    resolved.sort_by_key(|(idx, span)| (*idx, span.addr));
    resolved.dedup_by_key(|(idx, span)| (*idx, span.addr));

    let file_len = bytes.len() as u64;
    let mut out = Vec::new();
    for (pos, (idx, span)) in resolved.iter().enumerate() {
        let section = &sections[*idx];
        let len = match span.size {
            Some(size) => size,
            None => {
                let limit = resolved
                    .get(pos + 1)
                    .filter(|(next_idx, _)| next_idx == idx)
                    .map(|(_, next)| next.addr)
                    .unwrap_or_else(|| section.end());
                limit - span.addr
            }
        };
        if let Some((start, end)) = section.file_range(span.addr, len, file_len) {
            out.push(ExtractedFunction {
                name: span.name.clone(),
                offset: start as u64,
                bytes: bytes[start..end].to_vec(),
            });
        }
    }
    out.sort_by_key(|f| f.offset);
    out
}
