//! stack::asset
//!
//! Content-addressed file assets shipped inside the assembly.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::construct::StructuralError;

/// Packaging of every asset this crate produces.
pub const FILE_PACKAGING: &str = "file";

/// A file registered with a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAsset {
    /// Where the file is read from at emit time.
    pub source: PathBuf,
    /// Lower-case hex SHA-256 of the content.
    pub hash: String,
    /// Extension including the leading dot, or empty.
    pub extension: String,
}

impl FileAsset {
    /// Hash the file at `path`.
    pub fn from_path(path: &Path) -> Result<Self, StructuralError> {
        let bytes = fs::read(path).map_err(|source| StructuralError::AssetSource {
            path: path.to_path_buf(),
            source,
        })?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{e}"))
            .unwrap_or_default();
        Ok(Self {
            source: path.to_path_buf(),
            hash: hex::encode(Sha256::digest(&bytes)),
            extension,
        })
    }

    /// File name inside the assembly directory.
    pub fn file_name(&self) -> String {
        format!("asset.{}{}", self.hash, self.extension)
    }

    /// Key under which the deployer uploads the file.
    pub fn object_key(&self) -> String {
        format!("{}{}", self.hash, self.extension)
    }

    /// Data of the `aws:cdk:asset` metadata entry.
    pub fn metadata(&self) -> Value {
        json!({
            "id": self.hash,
            "packaging": FILE_PACKAGING,
            "path": self.file_name(),
            "sourceHash": self.hash,
        })
    }

    /// Entry of this asset in an asset manifest's `files` table.
    pub fn manifest_entry(&self) -> Value {
        json!({
            "source": {
                "path": self.file_name(),
                "packaging": FILE_PACKAGING,
            },
            "destinations": {
                "current_account-current_region": {
                    "bucketName": "cdk-assets-${AWS::AccountId}-${AWS::Region}",
                    "objectKey": self.object_key(),
                }
            }
        })
    }
}
