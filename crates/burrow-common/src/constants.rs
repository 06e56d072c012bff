//! System-wide constants and default paths.

/// Default runtime root on Linux with root access.
pub const DEFAULT_ROOT: &str = "/var/lib/burrow";

/// Mount table scanned to locate cgroup v1 controllers.
pub const DEFAULT_MOUNTINFO: &str = "/proc/self/mountinfo";

/// Directory where `ip netns` keeps named network namespaces. Fixed by
/// iproute2, so not configurable.
pub const NETNS_DIR: &str = "/var/run/netns";

/// Per-container state lives under `<root>/container/<name>`.
pub const CONTAINER_DIR: &str = "container";
/// Container record file name.
pub const RECORD_FILE: &str = "config.json";
/// Container log file name.
pub const LOG_FILE: &str = "container.log";
/// Writable overlay layer directory name.
pub const WRITE_LAYER_DIR: &str = "writeOnly";
/// Overlay work directory name.
pub const WORK_LAYER_DIR: &str = "work";
/// Merged mount point directory name.
pub const MOUNT_DIR: &str = "mnt";

/// Shared read-only image layers live under `<root>/readOnly/<image>`.
pub const READ_ONLY_DIR: &str = "readOnly";
/// Image archives live under `<root>/images/<image>.tar`.
pub const IMAGES_DIR: &str = "images";

/// Network records live under `<root>/network/<name>`.
pub const NETWORK_DIR: &str = "network";
/// IPAM state directory under the network directory.
pub const IPAM_DIR: &str = "ipam";
/// IPAM bitmap store file name.
pub const IPAM_FILE: &str = "subnet.json";

/// Sub-command the runtime re-executes itself with inside new namespaces.
pub const INIT_SUBCOMMAND: &str = "init";

/// File descriptor number the init half reads its payload from.
pub const INIT_PIPE_FD: i32 = 3;

/// Environment variable carrying the container mount root to the child.
pub const ENV_MOUNT_ROOT: &str = "BURROW_MOUNT_ROOT";
/// Environment variable carrying the container hostname to the child.
pub const ENV_HOSTNAME: &str = "BURROW_HOSTNAME";

/// Length of generated container identifiers.
pub const CONTAINER_ID_LEN: usize = 10;
/// Length of generated network identifiers.
pub const NETWORK_ID_LEN: usize = 12;

/// Application name used in CLI output.
pub const APP_NAME: &str = "burrow";
