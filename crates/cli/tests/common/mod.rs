#![allow(dead_code)]

use std::path::{Path, PathBuf};

use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// Reproducible filler bytes for function bodies.
pub fn body(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_add(0x9e37_79b9_7f4a_7c15);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

/// Relocatable x86_64 ELF with one sized text symbol per function.
pub fn write_elf(dir: &Path, name: &str, functions: &[(&str, Vec<u8>)]) -> PathBuf {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);

    for (sym_name, bytes) in functions {
        let offset = obj.append_section_data(text_id, bytes, 1);
        obj.add_symbol(Symbol {
            name: sym_name.as_bytes().to_vec(),
            value: offset,
            size: bytes.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text_id),
            flags: SymbolFlags::None,
        });
    }

    let path = dir.join(name);
    std::fs::write(&path, obj.write().expect("write object")).expect("write fixture");
    path
}

/// Two large functions shared by every "family" sample.
pub fn family_functions() -> Vec<(&'static str, Vec<u8>)> {
    vec![("decrypt_config", body(1, 512)), ("beacon_loop", body(2, 384))]
}
