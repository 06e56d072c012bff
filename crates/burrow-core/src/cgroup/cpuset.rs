//! CPU pinning via the v1 `cpuset` controller.

use burrow_common::types::ResourceLimits;

/// Controller name as it appears in the mount table.
pub const CONTROLLER: &str = "cpuset";

/// File holding the allowed CPU list.
pub const LIMIT_FILE: &str = "cpuset.cpus";

/// Returns the value to write into [`LIMIT_FILE`], if a CPU list is set.
pub fn limit_value(limits: &ResourceLimits) -> Option<String> {
    let cpus = limits.cpuset_cpus.trim();
    (!cpus.is_empty()).then(|| cpus.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_list_leaves_controller_inert() {
        let limits = ResourceLimits {
            cpuset_cpus: "  ".into(),
            ..ResourceLimits::default()
        };
        assert_eq!(limit_value(&limits), None);
    }
}
