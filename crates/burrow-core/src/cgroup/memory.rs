//! Memory ceilings via the v1 `memory` controller.

use burrow_common::types::ResourceLimits;

/// Controller name as it appears in the mount table.
pub const CONTROLLER: &str = "memory";

/// File holding the hard memory ceiling.
pub const LIMIT_FILE: &str = "memory.limit_in_bytes";

/// Returns the value to write into [`LIMIT_FILE`], if a ceiling is set.
///
/// The kernel accepts suffixed values such as `100m`, so the string is
/// passed through untouched.
pub fn limit_value(limits: &ResourceLimits) -> Option<String> {
    let memory = limits.memory_limit.trim();
    (!memory.is_empty()).then(|| memory.to_string())
}
