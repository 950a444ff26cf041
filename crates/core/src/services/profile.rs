//! Per-target preparation: identity, filetype and function fingerprints.

use std::path::{Path, PathBuf};

use goblin::{elf, mach, pe, Object};
use memchr::memmem;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::model::{ContentDigest, Fingerprint};
use crate::services::extract::{filter_candidates, FunctionExtractor};
use crate::similarity::FingerprintHasher;

/// Byte markers left behind by common executable packers, checked in order.
const PACKER_MARKERS: &[&str] =
    &["UPX", "aspack", "NSP", "NTKrnl", "PEC2", "PECompact2", "Thermida", "aPa2Wa"];

/// Everything the scorer and the learning pipeline need to know about a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    pub path: PathBuf,
    pub digest: ContentDigest,
    pub filetype: String,
    /// One fingerprint per candidate function, parallel to `sizes`.
    pub fingerprints: Vec<Fingerprint>,
    pub sizes: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packer: Option<String>,
}

impl TargetProfile {
    /// Read, sniff and fingerprint `path`, keeping functions longer than `min_size` bytes.
    pub fn from_path(
        path: &Path,
        extractor: &dyn FunctionExtractor,
        hasher: &dyn FingerprintHasher,
        min_size: u64,
    ) -> EngineResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| EngineError::extraction(path, e))?;
        let digest = ContentDigest::of_bytes(&bytes);
        let filetype = sniff_filetype(&bytes);

        let packer = detect_packer(&bytes);
        if let Some(name) = packer {
            // Unpacking is not supported; packed code usually scores as noise.
            warn!(path = %path.display(), packer = name, "target looks packed");
        }

        let functions = filter_candidates(extractor.extract(path)?, min_size);
        let sizes: Vec<u64> = functions.iter().map(|f| f.len()).collect();
        let fingerprints: Vec<Fingerprint> =
            functions.par_iter().map(|f| hasher.hash(&f.bytes)).collect();

        debug!(
            path = %path.display(),
            digest = %digest,
            filetype = %filetype,
            functions = fingerprints.len(),
            extractor = extractor.name(),
            "profiled target"
        );

        Ok(Self {
            path: path.to_path_buf(),
            digest,
            filetype,
            fingerprints,
            sizes,
            packer: packer.map(str::to_string),
        })
    }
}

/// First packer marker found anywhere in `bytes`.
pub fn detect_packer(bytes: &[u8]) -> Option<&'static str> {
    PACKER_MARKERS.iter().copied().find(|marker| memmem::find(bytes, marker.as_bytes()).is_some())
}

/// Short description of the container format, used as the "same filetype" key.
pub fn sniff_filetype(bytes: &[u8]) -> String {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => {
            let bits = if elf.is_64 { 64 } else { 32 };
            format!("ELF {bits}-bit {}", elf_machine(elf.header.e_machine))
        }
        Ok(Object::PE(pe)) => {
            let flavor = if pe.is_64 { "PE32+" } else { "PE32" };
            let kind = if pe.is_lib { " (DLL)" } else { "" };
            format!("{flavor}{kind} {}", pe_machine(pe.header.coff_header.machine))
        }
        Ok(Object::Mach(mach::Mach::Binary(bin))) => {
            let bits = if bin.is_64 { 64 } else { 32 };
            format!("Mach-O {bits}-bit {}", mach_cpu(bin.header.cputype()))
        }
        Ok(Object::Mach(mach::Mach::Fat(_))) => "Mach-O universal binary".to_string(),
        Ok(Object::Archive(_)) => "ar archive".to_string(),
        _ => "data".to_string(),
    }
}

fn elf_machine(machine: u16) -> String {
    match machine {
        elf::header::EM_X86_64 => "x86_64".into(),
        elf::header::EM_386 => "x86".into(),
        elf::header::EM_AARCH64 => "arm64".into(),
        elf::header::EM_ARM => "arm".into(),
        elf::header::EM_MIPS => "mips".into(),
        elf::header::EM_PPC => "ppc".into(),
        elf::header::EM_PPC64 => "ppc64".into(),
        elf::header::EM_RISCV => "riscv".into(),
        other => format!("machine {other:#x}"),
    }
}

fn pe_machine(machine: u16) -> String {
    match machine {
        pe::header::COFF_MACHINE_X86 => "x86".into(),
        pe::header::COFF_MACHINE_X86_64 => "x86_64".into(),
        pe::header::COFF_MACHINE_ARM => "arm".into(),
        pe::header::COFF_MACHINE_ARM64 => "arm64".into(),
        other => format!("machine {other:#x}"),
    }
}

fn mach_cpu(cputype: u32) -> String {
    match cputype {
        mach::cputype::CPU_TYPE_X86 => "x86".into(),
        mach::cputype::CPU_TYPE_X86_64 => "x86_64".into(),
        mach::cputype::CPU_TYPE_ARM => "arm".into(),
        mach::cputype::CPU_TYPE_ARM64 => "arm64".into(),
        other => format!("cpu {other:#x}"),
    }
}
