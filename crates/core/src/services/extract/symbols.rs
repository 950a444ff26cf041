use std::path::Path;

use goblin::{elf, mach, pe, Object};
use tracing::debug;

use super::{
    read_binary, slice_functions, ExtractError, ExtractedFunction, FunctionExtractor, FunctionSpan,
    SectionRange,
};

/// Extractor that reads function symbols from ELF, PE and Mach-O headers.
///
/// Stripped binaries yield no functions; that is not an error here.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymbolExtractor;

impl FunctionExtractor for SymbolExtractor {
    fn name(&self) -> &'static str {
        "symbols"
    }

    fn extract(&self, path: &Path) -> Result<Vec<ExtractedFunction>, ExtractError> {
        let bytes = read_binary(path)?;
        let unsupported = || ExtractError::UnsupportedFormat { path: path.to_path_buf() };

        let (spans, sections) = match Object::parse(&bytes).map_err(|_| unsupported())? {
            Object::Elf(elf) => (elf_spans(&elf), elf_sections(&elf)),
            Object::PE(pe) => (pe_spans(&pe), pe_sections(&pe)),
            Object::Mach(mach::Mach::Binary(bin)) => (mach_spans(&bin), mach_sections(&bin)),
            _ => return Err(unsupported()),
        };

        let functions = slice_functions(spans, &sections, &bytes);
        debug!(path = %path.display(), functions = functions.len(), "extracted function symbols");
        Ok(functions)
    }
}

fn elf_spans(elf: &elf::Elf) -> Vec<FunctionSpan> {
    // Relocatable objects put every section at address 0.
    let relocatable = elf.header.e_type == elf::header::ET_REL;
    let mut spans = symtab_spans(&elf.syms, &elf.strtab, relocatable);
    if spans.is_empty() {
        spans = symtab_spans(&elf.dynsyms, &elf.dynstrtab, relocatable);
    }
    spans
}

fn symtab_spans(
    syms: &elf::Symtab,
    strtab: &goblin::strtab::Strtab,
    relocatable: bool,
) -> Vec<FunctionSpan> {
    syms.iter()
        .filter(|sym| {
            sym.is_function()
                && (sym.st_value > 0 || relocatable)
                && sym.st_shndx != elf::section_header::SHN_UNDEF as usize
        })
        .map(|sym| FunctionSpan {
            name: strtab.get_at(sym.st_name).filter(|n| !n.is_empty()).map(str::to_string),
            addr: sym.st_value,
            size: Some(sym.st_size).filter(|&s| s > 0),
            section: Some(sym.st_shndx),
        })
        .collect()
}

/// One entry per section header so symbol `st_shndx` indexes straight in.
fn elf_sections(elf: &elf::Elf) -> Vec<SectionRange> {
    elf.section_headers
        .iter()
        .map(|sh| SectionRange {
            addr: sh.sh_addr,
            size: sh.sh_size,
            file_offset: sh.sh_offset,
            file_size: if sh.sh_type == elf::section_header::SHT_NOBITS { 0 } else { sh.sh_size },
        })
        .collect()
}

fn pe_spans(pe: &pe::PE) -> Vec<FunctionSpan> {
    pe.exports
        .iter()
        .filter(|exp| exp.rva != 0)
        .map(|exp| FunctionSpan {
            name: exp.name.filter(|n| !n.is_empty()).map(str::to_string),
            addr: exp.rva as u64,
            size: None,
            section: None,
        })
        .collect()
}

fn pe_sections(pe: &pe::PE) -> Vec<SectionRange> {
    pe.sections
        .iter()
        .map(|sec| {
            let size = if sec.virtual_size == 0 { sec.size_of_raw_data } else { sec.virtual_size };
            SectionRange {
                addr: u64::from(sec.virtual_address),
                size: u64::from(size),
                file_offset: u64::from(sec.pointer_to_raw_data),
                file_size: u64::from(sec.size_of_raw_data.min(size)),
            }
        })
        .collect()
}

fn mach_spans(bin: &mach::MachO) -> Vec<FunctionSpan> {
    bin.symbols()
        .filter_map(Result::ok)
        .filter(|(_, nlist)| {
            nlist.n_value != 0
                && nlist.n_sect != mach::symbols::NO_SECT as usize
                && nlist.n_type & mach::symbols::N_STAB == 0
        })
        .map(|(name, nlist)| FunctionSpan {
            name: Some(name.trim_start_matches('_').to_string()).filter(|n| !n.is_empty()),
            addr: nlist.n_value,
            size: None,
            section: None,
        })
        .collect()
}

fn mach_sections(bin: &mach::MachO) -> Vec<SectionRange> {
    bin.segments
        .sections()
        .flatten()
        .filter_map(Result::ok)
        .map(|(sec, _)| SectionRange {
            addr: sec.addr,
            size: sec.size,
            file_offset: u64::from(sec.offset),
            file_size: if sec.offset == 0 { 0 } else { sec.size },
        })
        .collect()
}
