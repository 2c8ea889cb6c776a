//! construct::metadata
//!
//! Well-known metadata entry types and trace capture.

use std::panic::Location;

/// Informational annotation.
pub const INFO: &str = "aws:cdk:info";

/// Warning annotation; fails validation in strict mode.
pub const WARNING: &str = "aws:cdk:warning";

/// Error annotation; always fails validation.
pub const ERROR: &str = "aws:cdk:error";

/// Logical id of a rendered resource.
pub const LOGICAL_ID: &str = "aws:cdk:logicalId";

/// Tags applied to a whole stack.
pub const STACK_TAGS: &str = "aws:cdk:stack-tags";

/// File asset descriptor.
pub const ASSET: &str = "aws:cdk:asset";

/// Resource-level template metadata key holding the construct path.
pub const PATH_METADATA_KEY: &str = "aws:cdk:path";

/// Context key that suppresses trace capture.
pub const DISABLE_STACK_TRACE: &str = "disable-stack-trace";

/// Source location of the caller, as `file:line:column`.
#[track_caller]
pub fn caller_trace() -> String {
    let location = Location::caller();
    format!(
        "{}:{}:{}",
        location.file(),
        location.line(),
        location.column()
    )
}

/// Whether an entry type must surface as a validation failure.
pub fn is_error(entry_type: &str, strict: bool) -> bool {
    entry_type == ERROR || (strict && entry_type == WARNING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_points_at_caller() {
        let trace = caller_trace();
        assert!(trace.starts_with(file!()), "{trace}");
        assert_eq!(trace.split(':').count(), 3);
    }

    #[test]
    fn strict_promotes_warnings() {
        assert!(is_error(ERROR, false));
        assert!(!is_error(WARNING, false));
        assert!(is_error(WARNING, true));
        assert!(!is_error(INFO, true));
    }
}
