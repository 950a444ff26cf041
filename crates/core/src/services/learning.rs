//! Validated insertion of classified binaries into the corpus.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{Catalog, WriteMode, WriteOutcome};
use crate::error::{EngineError, EngineResult};
use crate::model::{
    BinaryMetadata, BinaryRecord, CatalogEntry, ContentDigest, Fingerprint, TrustLevel,
};
use crate::services::profile::TargetProfile;
use crate::services::signatures::SignatureFile;

/// What a successful ingestion did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub id: ContentDigest,
    pub trust_level: TrustLevel,
    /// `Inserted` or `Replaced`; duplicates surface as `AlreadyCataloged`.
    pub outcome: WriteOutcome,
    pub fingerprints: usize,
}

/// Writes classified binaries through a [`Catalog`].
pub struct LearningPipeline<'a> {
    catalog: &'a dyn Catalog,
}

impl<'a> LearningPipeline<'a> {
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self { catalog }
    }

    /// Persist `entry`. Without `overwrite` an existing id fails with
    /// `AlreadyCataloged` and nothing changes; with it, the old record and its
    /// fingerprints are replaced in one transaction.
    pub fn ingest(&self, entry: CatalogEntry, overwrite: bool) -> EngineResult<IngestOutcome> {
        if entry.fingerprints.is_empty() {
            return Err(EngineError::EmptyFunctionSet);
        }

        let id = entry.record.id.clone();
        let outcome = self.catalog.write_entry(&entry, WriteMode::from_overwrite(overwrite))?;
        if outcome == WriteOutcome::Duplicate {
            return Err(EngineError::AlreadyCataloged(id));
        }

        info!(
            id = %id,
            trust_level = %entry.record.trust_level,
            functions = entry.fingerprints.len(),
            ?outcome,
            "binary added to corpus"
        );
        Ok(IngestOutcome {
            id,
            trust_level: entry.record.trust_level,
            outcome,
            fingerprints: entry.fingerprints.len(),
        })
    }

    /// Validate unchecked strings, then ingest. Any malformed value fails the
    /// whole call with `InvalidFingerprint` before the catalog is touched.
    pub fn ingest_raw<S: AsRef<str>>(
        &self,
        digest: &str,
        fingerprints: &[S],
        trust_level: TrustLevel,
        filetype: &str,
        metadata: BinaryMetadata,
        overwrite: bool,
    ) -> EngineResult<IngestOutcome> {
        let id = ContentDigest::parse(digest)?;
        let fingerprints = fingerprints
            .iter()
            .map(|fp| Fingerprint::parse(fp.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        let record = BinaryRecord::new(id, trust_level, filetype, metadata);
        self.ingest(CatalogEntry { record, fingerprints }, overwrite)
    }

    pub fn ingest_profile(
        &self,
        profile: &TargetProfile,
        trust_level: TrustLevel,
        metadata: BinaryMetadata,
        overwrite: bool,
    ) -> EngineResult<IngestOutcome> {
        let record =
            BinaryRecord::new(profile.digest.clone(), trust_level, &*profile.filetype, metadata);
        self.ingest(CatalogEntry { record, fingerprints: profile.fingerprints.clone() }, overwrite)
    }

    pub fn ingest_signatures(
        &self,
        signatures: SignatureFile,
        trust_level: TrustLevel,
        filetype: &str,
        metadata: BinaryMetadata,
        overwrite: bool,
    ) -> EngineResult<IngestOutcome> {
        let record = BinaryRecord::new(signatures.digest, trust_level, filetype, metadata);
        self.ingest(CatalogEntry { record, fingerprints: signatures.fingerprints }, overwrite)
    }
}
