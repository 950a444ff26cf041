//! Core data model for catalogued binaries and their function fingerprints.
//!
//! The identifier types here carry their format contract in the constructor:
//! a `ContentDigest` is always 64 lowercase hex characters (SHA-256) and a
//! `Fingerprint` always matches `blockSize:part1:part2`. Anything that holds
//! one of these values has already been validated.

use std::fmt;
use std::fs;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

static DIGEST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("valid digest regex"));

// Empty parts are legal: zero-entropy input never triggers a piece boundary.
static FINGERPRINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+:[A-Za-z0-9/+]*:[A-Za-z0-9/+]*$").expect("valid fingerprint regex")
});

/// Rejected identifier or label input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("content digest {0:?} is not a 64-character hex SHA-256 digest")]
    Digest(String),
    #[error("fingerprint {0:?} does not match blockSize:part1:part2")]
    Fingerprint(String),
    #[error("unknown trust level {0:?}; expected whitelist or blacklist")]
    TrustLevel(String),
}

/// Stable identity of a binary: SHA-256 of its full byte content, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn parse(value: &str) -> Result<Self, FormatError> {
        let trimmed = value.trim();
        if DIGEST_RE.is_match(trimmed) {
            Ok(Self(trimmed.to_ascii_lowercase()))
        } else {
            Err(FormatError::Digest(value.to_string()))
        }
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Hash a file in fixed-size chunks.
    pub fn of_file(path: &Path) -> std::io::Result<Self> {
        let file = fs::File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 8192];

        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ContentDigest {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentDigest> for String {
    fn from(value: ContentDigest) -> Self {
        value.0
    }
}

impl ToSql for ContentDigest {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0.as_str()))
    }
}

impl FromSql for ContentDigest {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Self::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Fuzzy hash of one function's bytes, `blockSize:part1:part2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Block sizes wider than `u32` are rejected so every accepted value
    /// compares as 100 against itself.
    pub fn parse(value: &str) -> Result<Self, FormatError> {
        let trimmed = value.trim();
        if FINGERPRINT_RE.is_match(trimmed) && parse_block_size(trimmed).is_some() {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(FormatError::Fingerprint(value.to_string()))
        }
    }

    /// Wrap hasher output that is already in `blockSize:part1:part2` form.
    pub(crate) fn from_hasher_output(value: String) -> Self {
        debug_assert!(FINGERPRINT_RE.is_match(&value), "hasher produced {value:?}");
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Block size prefix; parsing already guaranteed it fits.
    pub fn block_size(&self) -> u32 {
        parse_block_size(&self.0).unwrap_or(0)
    }
}

fn parse_block_size(value: &str) -> Option<u32> {
    value.split(':').next()?.parse().ok()
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Classification label of a catalogued binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Known-good software.
    Whitelist,
    /// Known-bad software.
    Blacklist,
}

impl TrustLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustLevel::Whitelist => "whitelist",
            TrustLevel::Blacklist => "blacklist",
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrustLevel {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whitelist" => Ok(TrustLevel::Whitelist),
            "blacklist" => Ok(TrustLevel::Blacklist),
            _ => Err(FormatError::TrustLevel(s.to_string())),
        }
    }
}

impl ToSql for TrustLevel {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TrustLevel {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_str()?.parse().map_err(|e: FormatError| FromSqlError::Other(Box::new(e)))
    }
}

/// Free-text metadata stored alongside a catalogued binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMetadata {
    pub author: String,
    pub filenames: String,
    pub comment: String,
}

impl Default for BinaryMetadata {
    fn default() -> Self {
        Self { author: "unknown".into(), filenames: "unknown".into(), comment: String::new() }
    }
}

/// One row of the `binaries` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRecord {
    pub id: ContentDigest,
    pub author: String,
    pub filenames: String,
    pub comment: String,
    pub trust_level: TrustLevel,
    /// Short file-type description used for "same filetype" comparisons.
    pub filetype: String,
}

impl BinaryRecord {
    pub fn new(
        id: ContentDigest,
        trust_level: TrustLevel,
        filetype: impl Into<String>,
        metadata: BinaryMetadata,
    ) -> Self {
        Self {
            id,
            author: metadata.author,
            filenames: metadata.filenames,
            comment: metadata.comment,
            trust_level,
            filetype: filetype.into(),
        }
    }
}

/// A binary record together with every fingerprint it owns; the unit of ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub record: BinaryRecord,
    pub fingerprints: Vec<Fingerprint>,
}

/// A catalogued binary eligible for comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateBinary {
    pub id: ContentDigest,
    pub trust_level: TrustLevel,
}
