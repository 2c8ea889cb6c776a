//! ls command - List artifacts in deployment order

use super::Context;
use crate::assembly::{ArtifactType, CloudAssembly};
use anyhow::{Context as _, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// One listed artifact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedArtifact {
    pub id: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Artifacts of an assembly, dependencies first.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub artifacts: Vec<ListedArtifact>,
}

impl Listing {
    pub fn of(assembly: &CloudAssembly) -> Result<Self> {
        let order = assembly
            .deploy_order()
            .context("Failed to order artifacts")?;
        let artifacts = order
            .into_iter()
            .filter_map(|id| {
                let artifact = assembly.artifact(&id)?;
                Some(ListedArtifact {
                    artifact_type: artifact.artifact_type,
                    environment: artifact.environment.clone(),
                    dependencies: artifact.dependencies.clone(),
                    id,
                })
            })
            .collect();
        Ok(Self { artifacts })
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .artifacts
            .iter()
            .map(|a| a.id.len())
            .max()
            .unwrap_or(0);
        for artifact in &self.artifacts {
            write!(f, "{:<width$}  {}", artifact.id, artifact.artifact_type)?;
            if let Some(env) = &artifact.environment {
                write!(f, "  {env}")?;
            }
            if !artifact.dependencies.is_empty() {
                write!(f, "  <- {}", artifact.dependencies.join(", "))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// List the artifacts of the assembly at `path`.
pub fn ls(ctx: &Context, path: &Path, json: bool) -> Result<()> {
    let assembly = CloudAssembly::open(path)
        .with_context(|| format!("Invalid cloud assembly at {}", path.display()))?;
    let listing = Listing::of(&assembly)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else if ctx.quiet {
        for artifact in &listing.artifacts {
            println!("{}", artifact.id);
        }
    } else {
        print!("{listing}");
    }
    Ok(())
}
