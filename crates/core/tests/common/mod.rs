#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use malsim_core::db::{
    CandidateFilter, Catalog, CorpusStore, DbResult, WriteMode, WriteOutcome,
};
use malsim_core::model::{
    BinaryMetadata, BinaryRecord, CandidateBinary, CatalogEntry, ContentDigest, Fingerprint,
    TrustLevel,
};
use malsim_core::services::ProgressObserver;
use malsim_core::similarity::FingerprintHasher;
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// Hasher with a fixed score table; identical strings score 100, unknown pairs 0.
#[derive(Default)]
pub struct TableHasher {
    scores: HashMap<(String, String), u8>,
}

impl TableHasher {
    pub fn with(mut self, a: &str, b: &str, score: u8) -> Self {
        self.scores.insert((a.to_string(), b.to_string()), score);
        self
    }
}

impl FingerprintHasher for TableHasher {
    fn hash(&self, bytes: &[u8]) -> Fingerprint {
        fp(&format!("3:{}:", bytes.len()))
    }

    fn compare(&self, a: &str, b: &str) -> u8 {
        if a == b {
            return 100;
        }
        self.scores.get(&(a.to_string(), b.to_string())).copied().unwrap_or(0)
    }
}

/// Catalog wrapper counting how many candidates' fingerprints were fetched.
pub struct CountingCatalog<C> {
    pub inner: C,
    pub fetched: AtomicUsize,
}

impl<C: Catalog> CountingCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, fetched: AtomicUsize::new(0) }
    }
}

impl<C: Catalog> Catalog for CountingCatalog<C> {
    fn contains_binary(&self, id: &ContentDigest) -> DbResult<bool> {
        self.inner.contains_binary(id)
    }

    fn get_binary(&self, id: &ContentDigest) -> DbResult<Option<BinaryRecord>> {
        self.inner.get_binary(id)
    }

    fn list_binaries(&self) -> DbResult<Vec<BinaryRecord>> {
        self.inner.list_binaries()
    }

    fn candidates(&self, filter: &CandidateFilter) -> DbResult<Vec<CandidateBinary>> {
        self.inner.candidates(filter)
    }

    fn fingerprints_for(&self, id: &ContentDigest) -> DbResult<Vec<String>> {
        self.fetched.fetch_add(1, Ordering::SeqCst);
        self.inner.fingerprints_for(id)
    }

    fn fingerprint_total(&self, filter: &CandidateFilter) -> DbResult<u64> {
        self.inner.fingerprint_total(filter)
    }

    fn memory_resident(&self) -> bool {
        self.inner.memory_resident()
    }

    fn write_entry(&self, entry: &CatalogEntry, mode: WriteMode) -> DbResult<WriteOutcome> {
        self.inner.write_entry(entry, mode)
    }
}

/// Records how many candidates had been fetched at each comparison.
pub struct FetchWatcher<'a> {
    fetched: &'a AtomicUsize,
    pub seen: Mutex<Vec<usize>>,
    pub last_total: Mutex<u64>,
}

impl<'a> FetchWatcher<'a> {
    pub fn new(fetched: &'a AtomicUsize) -> Self {
        Self { fetched, seen: Mutex::new(Vec::new()), last_total: Mutex::new(0) }
    }

    pub fn seen(&self) -> Vec<usize> {
        let mut seen = self.seen.lock().expect("lock").clone();
        seen.sort_unstable();
        seen
    }
}

impl ProgressObserver for FetchWatcher<'_> {
    fn on_progress(&self, _done: u64, total: u64) {
        self.seen.lock().expect("lock").push(self.fetched.load(Ordering::SeqCst));
        *self.last_total.lock().expect("lock") = total;
    }
}

pub fn fp(value: &str) -> Fingerprint {
    Fingerprint::parse(value).expect("valid fingerprint")
}

/// Deterministic digest derived from a label.
pub fn digest(label: &str) -> ContentDigest {
    ContentDigest::of_bytes(label.as_bytes())
}

pub fn entry(label: &str, trust: TrustLevel, filetype: &str, fps: &[&str]) -> CatalogEntry {
    let metadata = BinaryMetadata {
        author: format!("{label}-author"),
        filenames: format!("{label}.bin"),
        comment: String::new(),
    };
    CatalogEntry {
        record: BinaryRecord::new(digest(label), trust, filetype, metadata),
        fingerprints: fps.iter().map(|f| fp(f)).collect(),
    }
}

pub fn seed(store: &CorpusStore, entries: &[CatalogEntry]) {
    for e in entries {
        store.write_entry(e, WriteMode::InsertOnly).expect("seed entry");
    }
}

/// Pseudo-random but reproducible bytes.
pub fn noise(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

/// Write a relocatable x86_64 ELF with one sized function symbol per body.
pub fn write_elf_fixture(dir: &Path, name: &str, functions: &[(&str, Vec<u8>)]) -> PathBuf {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);

    for (sym_name, body) in functions {
        let offset = obj.append_section_data(text_id, body, 1);
        obj.add_symbol(Symbol {
            name: sym_name.as_bytes().to_vec(),
            value: offset,
            size: body.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text_id),
            flags: SymbolFlags::None,
        });
    }

    let bytes = obj.write().expect("write object");
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}
