//! CPU share weighting via the v1 `cpu` controller.

use burrow_common::types::ResourceLimits;

/// Controller name as it appears in the mount table.
pub const CONTROLLER: &str = "cpu";

/// File holding the relative CPU weight.
pub const LIMIT_FILE: &str = "cpu.shares";

/// Returns the value to write into [`LIMIT_FILE`], if shares are set.
pub fn limit_value(limits: &ResourceLimits) -> Option<String> {
    (limits.cpu_shares != 0).then(|| limits.cpu_shares.to_string())
}
