use serde::{Deserialize, Serialize};
use sysinfo::System;
use tracing::{debug, info, warn};

use crate::db::{
    CandidateFilter, Catalog, CorpusStore, DbResult, StoreLocation, WriteMode, WriteOutcome,
};
use crate::model::{BinaryRecord, CandidateBinary, CatalogEntry, ContentDigest};

/// A replica must fit in this fraction of free memory (estimate * 2 <= free).
const MIRROR_HEADROOM: u64 = 2;

/// Source of the "how much memory is free right now" reading.
pub trait MemoryProbe {
    /// Available bytes, or `None` when the reading is unavailable.
    fn available_bytes(&self) -> Option<u64>;
}

/// Reads available memory from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemMemory;

impl MemoryProbe for SystemMemory {
    fn available_bytes(&self) -> Option<u64> {
        let mut sys = System::new();
        sys.refresh_memory();
        match sys.available_memory() {
            0 => None,
            bytes => Some(bytes),
        }
    }
}

/// Caller preference for how the corpus is accessed during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Mirror into memory when it fits, otherwise read from disk.
    Auto,
    /// Never mirror.
    DiskOnly,
}

impl CacheMode {
    pub fn from_leave_on_disk(leave_on_disk: bool) -> Self {
        if leave_on_disk {
            CacheMode::DiskOnly
        } else {
            CacheMode::Auto
        }
    }
}

/// Which store is answering reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backing {
    Disk,
    Memory,
}

/// Run-scoped view of the corpus.
///
/// Reads go to a full in-memory replica when one was made, otherwise to the
/// durable store. Writes always commit to the durable store first and are then
/// replayed into the replica so later reads in the same run observe them. The
/// replica is dropped with the cache.
#[derive(Debug)]
pub struct CorpusCache {
    durable: CorpusStore,
    replica: Option<CorpusStore>,
}

impl CorpusCache {
    /// Decide on the backing for this run and mirror if feasible.
    pub fn acquire(
        durable: CorpusStore,
        mode: CacheMode,
        probe: &dyn MemoryProbe,
    ) -> DbResult<Self> {
        if mode == CacheMode::DiskOnly || *durable.location() == StoreLocation::Memory {
            return Ok(Self::disk_backed(durable));
        }

        let estimate = durable.estimated_size()?;
        let fits = match probe.available_bytes() {
            Some(free) => estimate.saturating_mul(MIRROR_HEADROOM) <= free,
            None => false,
        };

        if !fits {
            warn!(
                estimated_bytes = estimate,
                "not enough free memory to load the corpus into memory; reading from disk"
            );
            return Ok(Self::disk_backed(durable));
        }

        match durable.mirror_into_memory() {
            Ok(replica) => {
                info!(estimated_bytes = estimate, "corpus mirrored into memory");
                Ok(Self { durable, replica: Some(replica) })
            }
            Err(err) => {
                warn!(error = %err, "failed to mirror corpus into memory; reading from disk");
                Ok(Self::disk_backed(durable))
            }
        }
    }

    /// Wrap a store without mirroring.
    pub fn disk_backed(durable: CorpusStore) -> Self {
        Self { durable, replica: None }
    }

    pub fn backing(&self) -> Backing {
        if self.replica.is_some() {
            Backing::Memory
        } else {
            Backing::Disk
        }
    }

    pub fn durable(&self) -> &CorpusStore {
        &self.durable
    }

    /// Discard the replica and hand back the durable store.
    pub fn release(self) -> CorpusStore {
        self.durable
    }

    fn reader(&self) -> &CorpusStore {
        self.replica.as_ref().unwrap_or(&self.durable)
    }
}

impl Catalog for CorpusCache {
    fn contains_binary(&self, id: &ContentDigest) -> DbResult<bool> {
        self.reader().contains_binary(id)
    }

    fn get_binary(&self, id: &ContentDigest) -> DbResult<Option<BinaryRecord>> {
        self.reader().get_binary(id)
    }

    fn list_binaries(&self) -> DbResult<Vec<BinaryRecord>> {
        self.reader().list_binaries()
    }

    fn candidates(&self, filter: &CandidateFilter) -> DbResult<Vec<CandidateBinary>> {
        self.reader().candidates(filter)
    }

    fn fingerprints_for(&self, id: &ContentDigest) -> DbResult<Vec<String>> {
        self.reader().fingerprints_for(id)
    }

    fn fingerprint_total(&self, filter: &CandidateFilter) -> DbResult<u64> {
        self.reader().fingerprint_total(filter)
    }

    fn memory_resident(&self) -> bool {
        self.reader().memory_resident()
    }

    fn write_entry(&self, entry: &CatalogEntry, mode: WriteMode) -> DbResult<WriteOutcome> {
        let outcome = self.durable.write_entry(entry, mode)?;
        if outcome == WriteOutcome::Duplicate {
            return Ok(outcome);
        }

        if let Some(replica) = &self.replica {
            // The durable commit already happened; a replica miss only affects reads.
            match replica.write_entry(entry, WriteMode::Replace) {
                Ok(_) => debug!(id = %entry.record.id, "replayed write into replica"),
                Err(err) => warn!(
                    id = %entry.record.id,
                    error = %err,
                    "failed to replay write into replica"
                ),
            }
        }
        Ok(outcome)
    }
}
