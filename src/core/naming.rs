//! core::naming
//!
//! Unique id derivation for construct paths.
//!
//! # Algorithm
//!
//! - A single alphanumeric component is returned unchanged, so top-level
//!   deployment units keep their own id as artifact id
//! - Otherwise the human part concatenates the components (dropping
//!   consecutive duplicates and the ids `Default` and `Resource`), strips
//!   non-alphanumerics and keeps at most the last 240 characters
//! - The first 8 hex characters of a SHA-256 over the full `/`-joined path
//!   are appended
//!
//! The result is a pure function of the path, alphanumeric, and at most
//! [`MAX_ID_LEN`] characters.

use sha2::{Digest, Sha256};

use super::types::PATH_SEP;

/// Id skipped in the human part and meant to "take over" its parent.
pub const HIDDEN_ID: &str = "Default";

/// Id skipped in the human part only.
pub const HIDDEN_FROM_HUMAN_ID: &str = "Resource";

/// Maximum length of a unique id.
pub const MAX_ID_LEN: usize = 255;

const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = MAX_ID_LEN - HASH_LEN - 7;

/// Derive a unique id from path components.
///
/// # Example
///
/// ```
/// use cxsynth::core::naming::make_unique_id;
///
/// assert_eq!(make_unique_id(&["App"]), "App");
///
/// let id = make_unique_id(&["App", "Bucket", "Resource"]);
/// assert!(id.starts_with("AppBucket"));
/// assert_eq!(id.len(), "AppBucket".len() + 8);
/// ```
pub fn make_unique_id(components: &[&str]) -> String {
    let components: Vec<&str> = components
        .iter()
        .copied()
        .filter(|c| !c.is_empty())
        .collect();

    match components.as_slice() {
        [] => return String::new(),
        [only] if is_plain(only) => return (*only).to_string(),
        _ => {}
    }

    let hash = path_hash(&components);
    let human = human_part(&components);

    format!("{human}{hash}")
}

/// First 8 upper-case hex characters of the SHA-256 over the joined path.
pub fn path_hash(components: &[&str]) -> String {
    let digest = Sha256::digest(components.join(PATH_SEP).as_bytes());
    hex::encode_upper(digest)[..HASH_LEN].to_string()
}

/// A unique id behind a fixed prefix, trimmed from the front to fit.
///
/// ```
/// use cxsynth::core::naming::prefixed_unique_id;
///
/// let id = prefixed_unique_id("ExportsOutput", &["Producer", "Bucket", "Arn"]);
/// assert!(id.starts_with("ExportsOutputProducerBucketArn"));
/// ```
pub fn prefixed_unique_id(prefix: &str, components: &[&str]) -> String {
    let id = make_unique_id(components);
    let room = MAX_ID_LEN.saturating_sub(prefix.len());
    let skip = id.len().saturating_sub(room);
    format!("{prefix}{}", &id[skip..])
}

fn is_plain(component: &str) -> bool {
    component.len() <= MAX_ID_LEN && component.chars().all(|c| c.is_ascii_alphanumeric())
}

fn human_part(components: &[&str]) -> String {
    let mut kept: Vec<&str> = Vec::with_capacity(components.len());
    for c in components {
        if kept.last() == Some(c) {
            continue;
        }
        kept.push(c);
    }

    let human: String = kept
        .into_iter()
        .filter(|c| *c != HIDDEN_ID && *c != HIDDEN_FROM_HUMAN_ID)
        .flat_map(|c| c.chars().filter(|ch| ch.is_ascii_alphanumeric()))
        .collect();

    // Keep the tail: the leaf end of the path is the most specific part.
    let skip = human.len().saturating_sub(MAX_HUMAN_LEN);
    human[skip..].to_string()
}
