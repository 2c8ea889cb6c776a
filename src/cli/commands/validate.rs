//! validate command - Check a Cloud Assembly against the manifest contract
//!
//! Loads `manifest.json` (upgrading older majors), validates references and
//! dependency order, and checks every referenced file exists.

use super::Context;
use crate::assembly::{CloudAssembly, ASSEMBLY_VERSION};
use crate::core::types::SchemaVersion;
use anyhow::{Context as _, Result};
use std::path::Path;

/// Validate the assembly at `path`.
pub fn validate(ctx: &Context, path: &Path, max_version: Option<&str>) -> Result<()> {
    let max = match max_version {
        Some(v) => SchemaVersion::parse(v).with_context(|| format!("Invalid --max-version '{v}'"))?,
        None => ASSEMBLY_VERSION,
    };

    let assembly = CloudAssembly::open_with_max(path, max)
        .with_context(|| format!("Invalid cloud assembly at {}", path.display()))?;
    let order = assembly
        .deploy_order()
        .context("Failed to order artifacts")?;

    if !ctx.quiet {
        let manifest = assembly.manifest();
        println!(
            "{}: version {}, {} artifact(s), {} stack(s)",
            assembly.directory().display(),
            manifest.version,
            order.len(),
            assembly.stacks().len()
        );
        if !manifest.missing.is_empty() {
            println!("{} missing context value(s):", manifest.missing.len());
            for missing in &manifest.missing {
                println!("  {} ({})", missing.key, missing.provider);
            }
        }
    }
    Ok(())
}
