//! Init half of the launch protocol.
//!
//! Runs as `burrow init` inside the freshly cloned namespaces. Any error
//! here is fatal: the process exits and the container never starts.

use std::convert::Infallible;
use std::ffi::CString;
use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;

use burrow_common::constants;
use burrow_common::error::{BurrowError, Result, StageExt};
use burrow_core::filesystem::{mount, pivot_root};
use burrow_core::namespace::{network, uts};

use crate::process::InitPayload;

/// Entry point of the `init` sub-command.
///
/// Blocks until the parent sends the payload, then joins the network
/// namespace, switches root, mounts `/proc` and `/dev`, sets the
/// hostname, and execs the workload. Only returns on failure.
///
/// # Errors
///
/// Returns the failing step; the caller must exit non-zero.
pub fn init_entry() -> Result<Infallible> {
    // SAFETY: the parent installs the pipe's read end as this fd before
    // exec, and nothing else in this process owns it.
    let pipe = unsafe { File::from_raw_fd(constants::INIT_PIPE_FD) };
    let payload = read_payload(pipe).stage("read init payload")?;
    tracing::info!(
        args = ?payload.args,
        root = %payload.mount_root.display(),
        hostname = %payload.hostname,
        "container init starting"
    );

    if let Some(netns) = &payload.netns {
        network::join(netns).stage("join network namespace")?;
    }
    pivot_root::switch_root(&payload.mount_root).stage("switch root")?;
    mount_pseudo_filesystems().stage("mount pseudo filesystems")?;
    uts::set_hostname(&payload.hostname).stage("set hostname")?;
    exec(&payload.args).stage("exec workload")
}

/// Reads the payload up to end-of-file.
fn read_payload(mut pipe: impl Read) -> Result<InitPayload> {
    let mut raw = String::new();
    let _ = pipe
        .read_to_string(&mut raw)
        .map_err(|e| BurrowError::io("init pipe", e))?;
    if raw.trim().is_empty() {
        return Err(BurrowError::config("parent closed the init pipe without a payload"));
    }
    let payload: InitPayload = serde_json::from_str(&raw)?;
    if payload.args.is_empty() {
        return Err(BurrowError::config("init payload has no command"));
    }
    Ok(payload)
}

fn mount_pseudo_filesystems() -> Result<()> {
    for dir in ["/proc", "/dev"] {
        std::fs::create_dir_all(dir).map_err(|e| BurrowError::io(dir, e))?;
    }
    mount::mount_proc()?;
    mount::mount_dev_tmpfs()
}

/// Replaces the process with `args`, searching `PATH` for the program.
fn exec(args: &[String]) -> Result<Infallible> {
    let argv = args
        .iter()
        .map(|a| {
            CString::new(a.as_bytes())
                .map_err(|e| BurrowError::config(format!("argument contains NUL: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;
    let program = argv
        .first()
        .ok_or_else(|| BurrowError::config("init payload has no command"))?;
    tracing::debug!(?program, "exec workload");
    nix::unistd::execvp(program, &argv).map_err(|e| BurrowError::syscall("execvp", e as i32))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn payload_is_read_to_eof() {
        let json = r#"{"args":["sh","-c","echo hi"],"mount_root":"/c/web/mnt","hostname":"web","netns":null}"#;
        let payload = read_payload(Cursor::new(json)).unwrap();
        assert_eq!(payload.args, ["sh", "-c", "echo hi"]);
        assert_eq!(payload.mount_root, PathBuf::from("/c/web/mnt"));
        assert!(payload.netns.is_none());
    }

    #[test]
    fn closed_pipe_without_payload_is_an_error() {
        let err = read_payload(Cursor::new("")).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }

    #[test]
    fn payload_without_command_is_an_error() {
        let json = r#"{"args":[],"mount_root":"/","hostname":"x","netns":null}"#;
        assert!(read_payload(Cursor::new(json)).is_err());
    }

    #[test]
    fn exec_rejects_interior_nul() {
        let err = exec(&["sh\0".to_string()]).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }
}
