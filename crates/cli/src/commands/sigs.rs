use std::path::Path;

use anyhow::{Context, Result};
use malsim_core::services::{ExtractorRegistry, SignatureFile, TargetProfile};
use malsim_core::similarity::SpamsumHasher;

use crate::commands::{resolve_config, select_extractor};

/// Fingerprint one binary and emit its signature file (stdout unless `output` is set).
pub fn sigs_command(
    path: &Path,
    output: Option<&Path>,
    config: Option<&Path>,
    extractor: Option<&str>,
) -> Result<()> {
    let engine = resolve_config(config, None)?;
    let registry = ExtractorRegistry::with_defaults();
    let extractor = select_extractor(&registry, extractor.unwrap_or(engine.extractor.as_str()))?;

    let profile =
        TargetProfile::from_path(path, extractor, &SpamsumHasher, engine.min_function_size)
            .with_context(|| format!("Failed to fingerprint {}", path.display()))?;
    let signatures = SignatureFile::from_profile(&profile);

    match output {
        Some(out) => {
            signatures.write(out)?;
            println!(
                "Wrote {} function signatures for {} to {}",
                signatures.fingerprints.len(),
                signatures.digest,
                out.display()
            );
        }
        None => print!("{}", signatures.render()),
    }
    Ok(())
}
