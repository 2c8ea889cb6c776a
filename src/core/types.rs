//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`ConstructId`] - Validated local id of a node in the construct tree
//! - [`LogicalId`] - Template-level identifier of a rendered element
//! - [`StackName`] - Deployed name of a deployment unit
//! - [`Environment`] - Target account/region/partition of a deployment unit
//! - [`SchemaVersion`] - `MAJOR.MINOR.PATCH` version of the manifest format
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, preventing entire classes of bugs.
//!
//! # Examples
//!
//! ```
//! use cxsynth::core::types::{ConstructId, Environment, SchemaVersion};
//!
//! let id = ConstructId::new("Web/Api").unwrap();
//! assert_eq!(id.as_str(), "Web--Api");
//!
//! let env = Environment::parse("aws://123456789012/us-east-1").unwrap();
//! assert_eq!(env.to_string(), "aws://123456789012/us-east-1");
//!
//! let v = SchemaVersion::parse("4.1.0").unwrap();
//! assert_eq!(v.major, 4);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::token::encoding;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid construct id: {0}")]
    InvalidConstructId(String),

    #[error("invalid logical id: {0}")]
    InvalidLogicalId(String),

    #[error("invalid stack name: {0}")]
    InvalidStackName(String),

    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    #[error("invalid schema version: {0}")]
    InvalidVersion(String),
}

/// Separator between path components.
pub const PATH_SEP: &str = "/";

/// Reserved replacement for [`PATH_SEP`] inside a local id.
pub const PATH_SEP_ESCAPE: &str = "--";

/// Maximum length of a logical id.
pub const MAX_LOGICAL_ID_LEN: usize = 255;

/// A validated local id of a construct.
///
/// Ids must be non-empty and must not embed token sentinels. A path
/// separator inside an id is escaped to [`PATH_SEP_ESCAPE`] so the id can
/// never be confused with a deeper path.
///
/// # Example
///
/// ```
/// use cxsynth::core::types::ConstructId;
///
/// assert_eq!(ConstructId::new("Bucket").unwrap().as_str(), "Bucket");
/// assert_eq!(ConstructId::new("a/b").unwrap().as_str(), "a--b");
/// assert!(ConstructId::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConstructId(String);

impl ConstructId {
    /// Create a new validated construct id, escaping path separators.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidConstructId` for empty ids or ids that
    /// contain an unresolved token.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidConstructId(
                "construct id cannot be empty".into(),
            ));
        }
        if encoding::contains_sentinel(&id) {
            return Err(TypeError::InvalidConstructId(format!(
                "construct id cannot contain tokens: '{id}'"
            )));
        }
        Ok(Self(id.replace(PATH_SEP, PATH_SEP_ESCAPE)))
    }

    /// The id of the tree root. Only the tree itself creates this.
    pub(crate) fn root() -> Self {
        Self(String::new())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConstructId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ConstructId> for String {
    fn from(id: ConstructId) -> Self {
        id.0
    }
}

impl std::fmt::Display for ConstructId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A template-level identifier: ASCII alphanumeric, at most 255 chars.
///
/// # Example
///
/// ```
/// use cxsynth::core::types::LogicalId;
///
/// assert!(LogicalId::new("Bucket83908E77").is_ok());
/// assert!(LogicalId::new("my-bucket").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogicalId(String);

impl LogicalId {
    /// Create a new validated logical id.
    pub fn new(id: impl Into<String>) -> Result<Self, TypeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypeError::InvalidLogicalId(
                "logical id cannot be empty".into(),
            ));
        }
        if id.len() > MAX_LOGICAL_ID_LEN {
            return Err(TypeError::InvalidLogicalId(format!(
                "logical id longer than {MAX_LOGICAL_ID_LEN} characters: '{id}'"
            )));
        }
        if !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(TypeError::InvalidLogicalId(format!(
                "logical id must be alphanumeric: '{id}'"
            )));
        }
        Ok(Self(id))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LogicalId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<LogicalId> for String {
    fn from(id: LogicalId) -> Self {
        id.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deployed stack name.
///
/// Must start with a letter and contain only letters, digits and `-`,
/// at most 128 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StackName(String);

impl StackName {
    /// Create a new validated stack name.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let mut chars = name.chars();
        match chars.next() {
            None => {
                return Err(TypeError::InvalidStackName(
                    "stack name cannot be empty".into(),
                ))
            }
            Some(c) if !c.is_ascii_alphabetic() => {
                return Err(TypeError::InvalidStackName(format!(
                    "stack name must start with a letter: '{name}'"
                )))
            }
            Some(_) => {}
        }
        if name.len() > 128 {
            return Err(TypeError::InvalidStackName(format!(
                "stack name longer than 128 characters: '{name}'"
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(TypeError::InvalidStackName(format!(
                "stack name may only contain letters, digits and '-': '{name}'"
            )));
        }
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StackName {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<StackName> for String {
    fn from(name: StackName) -> Self {
        name.0
    }
}

impl std::fmt::Display for StackName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Environment scheme used in manifest environment strings.
pub const ENVIRONMENT_SCHEME: &str = "aws";

/// Placeholder written for an agnostic account.
pub const UNKNOWN_ACCOUNT: &str = "unknown-account";

/// Placeholder written for an agnostic region.
pub const UNKNOWN_REGION: &str = "unknown-region";

/// One component of an environment: concrete, or resolved at deploy time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum EnvValue {
    /// Known at synthesis time.
    Concrete(String),
    /// Resolved by the deployer.
    #[default]
    Agnostic,
}

impl EnvValue {
    /// Whether the value is known at synthesis time.
    pub fn is_concrete(&self) -> bool {
        matches!(self, EnvValue::Concrete(_))
    }

    /// Get the concrete value, if any.
    pub fn as_concrete(&self) -> Option<&str> {
        match self {
            EnvValue::Concrete(v) => Some(v),
            EnvValue::Agnostic => None,
        }
    }

    /// Both concrete and unequal.
    fn differs_from(&self, other: &EnvValue) -> bool {
        match (self, other) {
            (EnvValue::Concrete(a), EnvValue::Concrete(b)) => a != b,
            _ => false,
        }
    }
}

/// The target of a deployment unit.
///
/// Any component may be [`EnvValue::Agnostic`]. The partition never
/// appears in the manifest environment string.
///
/// # Example
///
/// ```
/// use cxsynth::core::types::Environment;
///
/// let agnostic = Environment::default();
/// assert_eq!(agnostic.to_string(), "aws://unknown-account/unknown-region");
///
/// let a = Environment::new("111111111111", "us-east-1");
/// let b = Environment::new("222222222222", "us-east-1");
/// assert!(a.concretely_differs(&b));
/// assert!(!a.concretely_differs(&agnostic));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Environment {
    pub account: EnvValue,
    pub region: EnvValue,
    pub partition: EnvValue,
}

impl Environment {
    /// A fully concrete account/region in the default partition.
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: EnvValue::Concrete(account.into()),
            region: EnvValue::Concrete(region.into()),
            partition: EnvValue::Concrete(ENVIRONMENT_SCHEME.to_string()),
        }
    }

    /// Parse a `scheme://account/region` string.
    ///
    /// `unknown-account` and `unknown-region` parse as agnostic.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let rest = s
            .strip_prefix(ENVIRONMENT_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| {
                TypeError::InvalidEnvironment(format!(
                    "expected '{ENVIRONMENT_SCHEME}://account/region', got '{s}'"
                ))
            })?;

        let (account, region) = rest.split_once('/').ok_or_else(|| {
            TypeError::InvalidEnvironment(format!("missing region in '{s}'"))
        })?;

        if account.is_empty() || region.is_empty() || region.contains('/') {
            return Err(TypeError::InvalidEnvironment(format!(
                "malformed environment '{s}'"
            )));
        }

        let account = match account {
            UNKNOWN_ACCOUNT => EnvValue::Agnostic,
            a => EnvValue::Concrete(a.to_string()),
        };
        let region = match region {
            UNKNOWN_REGION => EnvValue::Agnostic,
            r => EnvValue::Concrete(r.to_string()),
        };

        Ok(Self {
            account,
            region,
            partition: EnvValue::Agnostic,
        })
    }

    /// True when every component is agnostic.
    pub fn is_agnostic(&self) -> bool {
        !self.account.is_concrete() && !self.region.is_concrete()
    }

    /// True when account or region are both concrete and differ.
    pub fn concretely_differs(&self, other: &Environment) -> bool {
        self.account.differs_from(&other.account) || self.region.differs_from(&other.region)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}://{}/{}",
            ENVIRONMENT_SCHEME,
            self.account.as_concrete().unwrap_or(UNKNOWN_ACCOUNT),
            self.region.as_concrete().unwrap_or(UNKNOWN_REGION)
        )
    }
}

/// A `MAJOR.MINOR.PATCH` version.
///
/// Ordering is numeric per component.
///
/// # Example
///
/// ```
/// use cxsynth::core::types::SchemaVersion;
///
/// let a = SchemaVersion::parse("4.99.0").unwrap();
/// let b = SchemaVersion::parse("5.0.0").unwrap();
/// assert!(a < b);
/// assert!(SchemaVersion::parse("5.0").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SchemaVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SchemaVersion {
    /// Create a version from its components.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a strict `X.Y.Z` string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(TypeError::InvalidVersion(format!(
                "expected MAJOR.MINOR.PATCH, got '{s}'"
            )));
        }

        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(TypeError::InvalidVersion(format!(
                    "non-numeric component in '{s}'"
                )));
            }
            *slot = part
                .parse()
                .map_err(|_| TypeError::InvalidVersion(format!("component overflow in '{s}'")))?;
        }

        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

impl TryFrom<String> for SchemaVersion {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<SchemaVersion> for String {
    fn from(v: SchemaVersion) -> Self {
        v.to_string()
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod construct_id {
        use super::*;

        #[test]
        fn plain_ids_are_kept() {
            assert_eq!(ConstructId::new("Bucket").unwrap().as_str(), "Bucket");
        }

        #[test]
        fn separator_is_escaped() {
            assert_eq!(ConstructId::new("a/b/c").unwrap().as_str(), "a--b--c");
        }

        #[test]
        fn empty_is_rejected() {
            assert!(matches!(
                ConstructId::new(""),
                Err(TypeError::InvalidConstructId(_))
            ));
        }

        #[test]
        fn tokens_are_rejected() {
            assert!(ConstructId::new("x${Token[TOKEN.1]}").is_err());
        }
    }

    mod logical_id {
        use super::*;

        #[test]
        fn alphanumeric_accepted() {
            assert!(LogicalId::new("MyBucketF68F3FF0").is_ok());
        }

        #[test]
        fn symbols_rejected() {
            assert!(LogicalId::new("my_bucket").is_err());
            assert!(LogicalId::new("").is_err());
        }

        #[test]
        fn length_limit() {
            assert!(LogicalId::new("A".repeat(255)).is_ok());
            assert!(LogicalId::new("A".repeat(256)).is_err());
        }
    }

    mod stack_name {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(StackName::new("App").is_ok());
            assert!(StackName::new("my-app-2").is_ok());
        }

        #[test]
        fn invalid_names() {
            assert!(StackName::new("").is_err());
            assert!(StackName::new("2app").is_err());
            assert!(StackName::new("my_app").is_err());
        }
    }

    mod environment {
        use super::*;

        #[test]
        fn parse_concrete() {
            let env = Environment::parse("aws://123456789012/eu-west-1").unwrap();
            assert_eq!(env.account, EnvValue::Concrete("123456789012".into()));
            assert_eq!(env.region, EnvValue::Concrete("eu-west-1".into()));
        }

        #[test]
        fn parse_agnostic() {
            let env = Environment::parse("aws://unknown-account/unknown-region").unwrap();
            assert!(env.is_agnostic());
        }

        #[test]
        fn parse_rejects_malformed() {
            assert!(Environment::parse("gcp://1/x").is_err());
            assert!(Environment::parse("aws://1").is_err());
            assert!(Environment::parse("aws://1/r/extra").is_err());
            assert!(Environment::parse("aws:///r").is_err());
        }

        #[test]
        fn display_roundtrip() {
            let s = "aws://123456789012/us-east-1";
            assert_eq!(Environment::parse(s).unwrap().to_string(), s);
        }

        #[test]
        fn region_difference_is_concrete() {
            let a = Environment::new("1", "us-east-1");
            let b = Environment::new("1", "eu-west-1");
            assert!(a.concretely_differs(&b));
        }

        #[test]
        fn agnostic_never_differs() {
            let a = Environment::new("1", "us-east-1");
            let b = Environment {
                account: EnvValue::Concrete("1".into()),
                ..Environment::default()
            };
            assert!(!a.concretely_differs(&b));
        }
    }

    mod schema_version {
        use super::*;

        #[test]
        fn parse_and_order() {
            let a = SchemaVersion::parse("4.99.0").unwrap();
            let b = SchemaVersion::parse("5.0.0").unwrap();
            let c = SchemaVersion::parse("4.100.0").unwrap();
            assert!(a < b);
            assert!(a < c);
            assert!(c < b);
        }

        #[test]
        fn rejects_garbage() {
            assert!(SchemaVersion::parse("").is_err());
            assert!(SchemaVersion::parse("1.2").is_err());
            assert!(SchemaVersion::parse("1.2.x").is_err());
            assert!(SchemaVersion::parse("1.2.3-beta").is_err());
            assert!(SchemaVersion::parse("+1.2.3").is_err());
        }

        #[test]
        fn serde_as_string() {
            let v = SchemaVersion::new(4, 0, 0);
            assert_eq!(serde_json::to_string(&v).unwrap(), "\"4.0.0\"");
            let parsed: SchemaVersion = serde_json::from_str("\"4.0.0\"").unwrap();
            assert_eq!(parsed, v);
        }
    }
}
