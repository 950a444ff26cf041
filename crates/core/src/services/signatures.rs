//! Precomputed signature files.
//!
//! Line 1 is the binary's content digest, every following non-blank line is one
//! function fingerprint. Surrounding whitespace is ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{ContentDigest, Fingerprint, FormatError};
use crate::services::profile::TargetProfile;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFile {
    pub digest: ContentDigest,
    pub fingerprints: Vec<Fingerprint>,
}

impl SignatureFile {
    pub fn from_profile(profile: &TargetProfile) -> Self {
        Self { digest: profile.digest.clone(), fingerprints: profile.fingerprints.clone() }
    }

    /// Parse and validate every line; one bad line rejects the whole file.
    pub fn parse(text: &str) -> Result<Self, FormatError> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        let digest = ContentDigest::parse(lines.next().unwrap_or_default())?;
        let fingerprints = lines.map(Fingerprint::parse).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { digest, fingerprints })
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(65 + self.fingerprints.len() * 80);
        out.push_str(self.digest.as_str());
        out.push('\n');
        for fingerprint in &self.fingerprints {
            out.push_str(fingerprint.as_str());
            out.push('\n');
        }
        out
    }

    pub fn read(path: &Path) -> EngineResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Ok(Self::parse(&text)?)
    }

    pub fn write(&self, path: &Path) -> EngineResult<()> {
        fs::write(path, self.render()).map_err(|e| EngineError::io(path, e))
    }
}
