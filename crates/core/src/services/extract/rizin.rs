use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use super::{
    read_binary, slice_functions, ExtractError, ExtractedFunction, FunctionExtractor, FunctionSpan,
    SectionRange,
};

/// Extractor that shells out to rizin for function discovery, so stripped
/// binaries still yield functions.
#[derive(Debug, Default, Clone)]
pub struct RizinExtractor {
    /// Explicit rizin binary; falls back to `$RIZIN_BIN`, then `rizin` on `PATH`.
    pub rizin_path: Option<PathBuf>,
}

impl FunctionExtractor for RizinExtractor {
    fn name(&self) -> &'static str {
        "rizin"
    }

    fn extract(&self, path: &Path) -> Result<Vec<ExtractedFunction>, ExtractError> {
        let bytes = read_binary(path)?;
        let rizin = self.rizin_path.clone().unwrap_or_else(resolve_rizin_path);

        // Tests feed synthetic JSON through these variables so rizin need not be installed.
        let funcs_json = fake_or_run("MALSIM_RIZIN_FAKE_FUNCS", &rizin, path, "aa;aflj")?;
        let sections_json = fake_or_run("MALSIM_RIZIN_FAKE_SECTIONS", &rizin, path, "iSj")?;

        let spans = parse_functions(&funcs_json).map_err(|e| backend(path, e))?;
        let sections = parse_sections(&sections_json).map_err(|e| backend(path, e))?;

        let functions = slice_functions(spans, &sections, &bytes);
        debug!(path = %path.display(), functions = functions.len(), "rizin analysis complete");
        Ok(functions)
    }
}

fn backend(path: &Path, message: impl ToString) -> ExtractError {
    ExtractError::Backend { path: path.to_path_buf(), message: message.to_string() }
}

fn resolve_rizin_path() -> PathBuf {
    std::env::var_os("RIZIN_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("rizin"))
}

fn fake_or_run(
    var: &str,
    rizin: &Path,
    binary: &Path,
    command: &str,
) -> Result<String, ExtractError> {
    if let Some(fake) = std::env::var_os(var) {
        return fs::read_to_string(&fake)
            .map_err(|e| backend(binary, format!("failed to read {var}: {e}")));
    }
    run_rizin_json(rizin, binary, command)
}

fn run_rizin_json(rizin: &Path, binary: &Path, command: &str) -> Result<String, ExtractError> {
    let output = Command::new(rizin)
        .args(["-2", "-q0", "-c", command])
        .arg(binary)
        .output()
        .map_err(|e| backend(binary, format!("failed to spawn rizin: {e}")))?;
    if !output.status.success() {
        return Err(backend(binary, format!("rizin exited with {}", output.status)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[derive(Debug, Deserialize)]
struct RizinFunction {
    #[serde(default)]
    offset: Option<u64>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RizinSection {
    #[serde(default)]
    vaddr: u64,
    #[serde(default)]
    paddr: u64,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    vsize: u64,
}

fn parse_functions(body: &str) -> Result<Vec<FunctionSpan>, String> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let funcs: Vec<RizinFunction> =
        serde_json::from_str(body).map_err(|e| format!("failed to parse rizin aflj JSON: {e}"))?;
    Ok(funcs
        .into_iter()
        .filter_map(|f| {
            Some(FunctionSpan { name: f.name, addr: f.offset?, size: f.size, section: None })
        })
        .collect())
}

fn parse_sections(body: &str) -> Result<Vec<SectionRange>, String> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    let sections: Vec<RizinSection> =
        serde_json::from_str(body).map_err(|e| format!("failed to parse rizin iSj JSON: {e}"))?;
    Ok(sections
        .into_iter()
        .filter(|s| s.vaddr > 0)
        .map(|s| SectionRange {
            addr: s.vaddr,
            size: s.vsize.max(s.size),
            file_offset: s.paddr,
            file_size: s.size,
        })
        .collect())
}
