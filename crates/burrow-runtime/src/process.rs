//! Parent half of the launch protocol.
//!
//! The runtime re-executes itself as `burrow init` inside new namespaces
//! via `clone(2)`. The child gets the read end of a pipe as fd 3 and
//! blocks on it; the parent configures cgroups and networking against
//! the child's pid and only then writes the [`InitPayload`] and closes
//! the pipe, which releases the child.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use burrow_common::constants;
use burrow_common::error::{BurrowError, Result};
use burrow_core::namespace::NamespaceConfig;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::logs;

/// Executable re-run as the container init.
const SELF_EXE: &str = "/proc/self/exe";

/// Stack handed to the cloned child; it only sets up fds and execs.
const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Exit code of a child that could not set up its fds.
const EXIT_SETUP_FAILED: i32 = 126;

/// Exit code of a child whose exec failed.
const EXIT_EXEC_FAILED: i32 = 127;

/// What the init half needs to finish setting up the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPayload {
    /// Command line to exec once isolated.
    pub args: Vec<String>,
    /// Directory that becomes `/`.
    pub mount_root: PathBuf,
    /// Hostname inside the UTS namespace.
    pub hostname: String,
    /// Named network namespace to join first, if networked.
    pub netns: Option<PathBuf>,
}

/// How to launch one container init.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Command line of the workload.
    pub command: Vec<String>,
    /// Merged root of the workspace.
    pub mount_root: PathBuf,
    /// Container hostname.
    pub hostname: String,
    /// Extra `KEY=VALUE` entries appended to the inherited environment.
    pub env: Vec<String>,
    /// Log file for stdout and stderr; `None` keeps stdio attached.
    pub log_path: Option<PathBuf>,
    /// Named network namespace for the init to join.
    pub netns: Option<PathBuf>,
    /// Namespaces to clone into.
    pub namespaces: NamespaceConfig,
}

impl LaunchConfig {
    /// Payload written to the child once the host side is ready.
    #[must_use]
    pub fn payload(&self) -> InitPayload {
        InitPayload {
            args: self.command.clone(),
            mount_root: self.mount_root.clone(),
            hostname: self.hostname.clone(),
            netns: self.netns.clone(),
        }
    }

    /// Environment of the init process: the current one with the user's
    /// entries and the container's root and hostname layered on top.
    fn environment(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let overridden = |key: &[u8]| {
            key == constants::ENV_MOUNT_ROOT.as_bytes() || key == constants::ENV_HOSTNAME.as_bytes()
        };
        let mut env: Vec<(Vec<u8>, Vec<u8>)> = std::env::vars_os()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .filter(|(k, _)| !overridden(k))
            .collect();

        for entry in &self.env {
            if let Some((key, value)) = entry.split_once('=') {
                env.retain(|(k, _)| k.as_slice() != key.as_bytes());
                env.push((key.as_bytes().to_vec(), value.as_bytes().to_vec()));
            }
        }
        env.push((
            constants::ENV_MOUNT_ROOT.as_bytes().to_vec(),
            self.mount_root.as_os_str().as_bytes().to_vec(),
        ));
        env.push((
            constants::ENV_HOSTNAME.as_bytes().to_vec(),
            self.hostname.as_bytes().to_vec(),
        ));
        env
    }
}

/// A launched init that may still be waiting for its payload.
#[derive(Debug)]
pub struct ContainerProcess {
    pid: Pid,
    pipe: Option<File>,
}

impl ContainerProcess {
    /// Host pid of the init.
    #[must_use]
    pub fn pid(&self) -> u32 {
        self.pid.as_raw().unsigned_abs()
    }

    /// Writes `payload` and closes the pipe, releasing the child.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload was already sent or the child is
    /// gone.
    pub fn send_init(&mut self, payload: &InitPayload) -> Result<()> {
        let mut pipe = self
            .pipe
            .take()
            .ok_or_else(|| BurrowError::config("init payload already sent"))?;
        let bytes = serde_json::to_vec(payload)?;
        pipe.write_all(&bytes)
            .and_then(|()| pipe.flush())
            .map_err(|e| BurrowError::io("init pipe", e))?;
        tracing::debug!(pid = self.pid(), "init payload sent");
        Ok(())
    }

    /// Blocks until the init exits and returns its exit code; a signal
    /// death is reported as `128 + signal`.
    ///
    /// # Errors
    ///
    /// Returns an error if `waitpid(2)` fails.
    pub fn wait(&self) -> Result<i32> {
        loop {
            match waitpid(self.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(code),
                Ok(WaitStatus::Signaled(_, signal, _)) => return Ok(128 + signal as i32),
                Ok(_) | Err(Errno::EINTR) => {}
                Err(errno) => return Err(BurrowError::syscall("waitpid", errno as i32)),
            }
        }
    }

    /// Kills and reaps a child that will not be used.
    pub fn abort(mut self) {
        drop(self.pipe.take());
        if let Err(e) = nix::sys::signal::kill(self.pid, Signal::SIGKILL) {
            tracing::warn!(pid = self.pid(), error = %e, "failed to kill aborted init");
            return;
        }
        let _ = waitpid(self.pid, None);
        tracing::info!(pid = self.pid(), "aborted init reaped");
    }
}

/// Everything the child needs, prepared before `clone(2)` so the child
/// only issues raw syscalls.
struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl ExecImage {
    fn prepare(config: &LaunchConfig) -> Result<Self> {
        let argv = [constants::APP_NAME, constants::INIT_SUBCOMMAND]
            .iter()
            .map(|s| c_string(s.as_bytes()))
            .collect::<Result<Vec<_>>>()?;
        let envp = config
            .environment()
            .into_iter()
            .map(|(mut k, v)| {
                k.push(b'=');
                k.extend_from_slice(&v);
                c_string(&k)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            path: c_string(OsStr::new(SELF_EXE).as_bytes())?,
            argv,
            envp,
        })
    }
}

fn c_string(bytes: &[u8]) -> Result<CString> {
    CString::new(bytes).map_err(|e| BurrowError::config(format!("argument contains NUL: {e}")))
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Clones the container init and returns it blocked on its pipe.
///
/// # Errors
///
/// Returns an error if the pipe, log, or `clone(2)` fails.
pub fn launch(config: &LaunchConfig) -> Result<ContainerProcess> {
    let image = ExecImage::prepare(config)?;
    let argv = null_terminated(&image.argv);
    let envp = null_terminated(&image.envp);

    let (read_end, write_end): (OwnedFd, OwnedFd) =
        nix::unistd::pipe2(OFlag::O_CLOEXEC).map_err(|e| BurrowError::syscall("pipe", e as i32))?;
    let stdio = match &config.log_path {
        Some(path) => Some(Stdio::detached(path)?),
        None => None,
    };

    let read_fd = read_end.as_raw_fd();
    let stdio_fds = stdio.as_ref().map(|s| (s.null.as_raw_fd(), s.log.as_raw_fd()));
    let exe = image.path.as_ptr();
    let child = Box::new(|| -> isize {
        // SAFETY: the child is a copy-on-write image of the parent; only
        // async-signal-safe calls on fds and pointers prepared above run
        // before execve replaces it.
        unsafe {
            if !install_fds(read_fd, stdio_fds) {
                libc::_exit(EXIT_SETUP_FAILED);
            }
            let _ = libc::execve(exe, argv.as_ptr(), envp.as_ptr());
            libc::_exit(EXIT_EXEC_FAILED)
        }
    });

    let mut stack = vec![0_u8; CHILD_STACK_SIZE];
    let flags = config.namespaces.clone_flags();
    // SAFETY: the callback never returns into the parent's frames (it
    // execs or exits) and the stack outlives the call.
    let pid = unsafe { nix::sched::clone(child, &mut stack, flags, Some(libc::SIGCHLD)) }
        .map_err(|e| BurrowError::syscall("clone", e as i32))?;
    drop(read_end);

    tracing::info!(pid = pid.as_raw(), ?flags, "container init cloned");
    Ok(ContainerProcess {
        pid,
        pipe: Some(File::from(write_end)),
    })
}

/// Redirections for a detached container.
struct Stdio {
    null: File,
    log: File,
}

impl Stdio {
    fn detached(log_path: &Path) -> Result<Self> {
        let null = File::open("/dev/null").map_err(|e| BurrowError::io("/dev/null", e))?;
        Ok(Self {
            null,
            log: logs::open_log(log_path)?,
        })
    }
}

/// Puts the pipe on fd 3 and, when detached, stdin on `/dev/null` and
/// stdout/stderr on the log. Returns `false` on any failure.
///
/// # Safety
///
/// Must only run in the freshly cloned child.
unsafe fn install_fds(read_fd: RawFd, stdio: Option<(RawFd, RawFd)>) -> bool {
    // SAFETY: plain fd syscalls on descriptors owned by this process.
    unsafe {
        let pipe_ok = if read_fd == constants::INIT_PIPE_FD {
            libc::fcntl(read_fd, libc::F_SETFD, 0) != -1
        } else {
            libc::dup2(read_fd, constants::INIT_PIPE_FD) != -1
        };
        if !pipe_ok {
            return false;
        }
        match stdio {
            Some((null, log)) => {
                libc::dup2(null, libc::STDIN_FILENO) != -1
                    && libc::dup2(log, libc::STDOUT_FILENO) != -1
                    && libc::dup2(log, libc::STDERR_FILENO) != -1
            }
            None => true,
        }
    }
}

/// Sends `signal` to `pid`. Returns `false` if no such process exists.
///
/// Pid 0 is never signalled, since that would hit the caller's own
/// process group.
///
/// # Errors
///
/// Returns an error for failures other than a missing process.
pub fn signal(pid: u32, signal: Option<Signal>) -> Result<bool> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match nix::sys::signal::kill(Pid::from_raw(raw), signal) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(BurrowError::syscall("kill", errno as i32)),
    }
}

/// Returns `true` if a process with `pid` exists.
#[must_use]
pub fn is_alive(pid: u32) -> bool {
    signal(pid, None).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LaunchConfig {
        LaunchConfig {
            command: vec!["top".into(), "-b".into()],
            mount_root: PathBuf::from("/srv/burrow/container/web/mnt"),
            hostname: "web".into(),
            env: vec!["MODE=test".into(), "PATH=/custom/bin".into()],
            log_path: None,
            netns: Some(PathBuf::from("/var/run/netns/web")),
            namespaces: NamespaceConfig::default(),
        }
    }

    fn lookup<'a>(env: &'a [(Vec<u8>, Vec<u8>)], key: &str) -> Vec<&'a [u8]> {
        env.iter()
            .filter(|(k, _)| k.as_slice() == key.as_bytes())
            .map(|(_, v)| v.as_slice())
            .collect()
    }

    #[test]
    fn payload_mirrors_launch_config() {
        let payload = config().payload();
        assert_eq!(payload.args, ["top", "-b"]);
        assert_eq!(payload.hostname, "web");
        assert_eq!(payload.netns, Some(PathBuf::from("/var/run/netns/web")));

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"mount_root\":\"/srv/burrow/container/web/mnt\""));
    }

    #[test]
    fn environment_layers_user_and_container_entries() {
        let env = config().environment();
        assert_eq!(lookup(&env, "MODE"), [b"test".as_slice()]);
        assert_eq!(lookup(&env, "PATH"), [b"/custom/bin".as_slice()]);
        assert_eq!(lookup(&env, constants::ENV_HOSTNAME), [b"web".as_slice()]);
        assert_eq!(
            lookup(&env, constants::ENV_MOUNT_ROOT),
            [b"/srv/burrow/container/web/mnt".as_slice()]
        );
    }

    #[test]
    fn exec_image_reexecs_init() {
        let image = ExecImage::prepare(&config()).unwrap();
        assert_eq!(image.path.to_str().unwrap(), "/proc/self/exe");
        assert_eq!(image.argv[1].to_str().unwrap(), "init");
        assert!(image.envp.iter().any(|e| e.to_str() == Ok("MODE=test")));
        assert_eq!(null_terminated(&image.argv).last(), Some(&std::ptr::null()));
    }

    #[test]
    fn nul_in_environment_is_rejected() {
        let cfg = LaunchConfig {
            env: vec!["BAD=a\0b".into()],
            ..config()
        };
        assert!(ExecImage::prepare(&cfg).is_err());
    }

    #[test]
    fn signal_reports_missing_and_live_processes() {
        assert!(signal(std::process::id(), None).unwrap());
        assert!(!signal(0, Some(Signal::SIGTERM)).unwrap());
        assert!(!signal(999_999_999, Some(Signal::SIGTERM)).unwrap());
        assert!(is_alive(std::process::id()));
    }
}
