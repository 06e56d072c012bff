//! Running extra commands inside a live container.

use burrow_common::error::{BurrowError, Result};

/// Namespaces `nsenter` joins, matching those a container is cloned into.
const NSENTER_FLAGS: [&str; 5] = ["--mount", "--uts", "--ipc", "--net", "--pid"];

/// Output from an exec command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command.
    pub exit_code: i32,
}

/// Joins the namespaces of the process `pid` and runs `command` there
/// with that process's environment.
///
/// # Errors
///
/// Returns an error if the command is empty, `nsenter` is not installed,
/// or the process environment cannot be read.
pub fn exec_in_container(pid: u32, command: &[String]) -> Result<ExecOutput> {
    if command.is_empty() {
        return Err(BurrowError::config("exec command is empty"));
    }
    let nsenter = which::which("nsenter")
        .map_err(|e| BurrowError::config(format!("nsenter not found in PATH: {e}")))?;
    let env = process_environ(pid)?;
    tracing::info!(pid, cmd = ?command, "exec into container");

    let output = std::process::Command::new(&nsenter)
        .arg("--target")
        .arg(pid.to_string())
        .args(NSENTER_FLAGS)
        .arg("--")
        .args(command)
        .env_clear()
        .envs(env)
        .output()
        .map_err(|e| BurrowError::io(&nsenter, e))?;

    Ok(ExecOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        exit_code: output.status.code().unwrap_or(-1),
    })
}

/// Reads the environment of process `pid` from `/proc/<pid>/environ`.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn process_environ(pid: u32) -> Result<Vec<(String, String)>> {
    let path = format!("/proc/{pid}/environ");
    let raw = std::fs::read(&path).map_err(|e| BurrowError::io(&path, e))?;
    Ok(parse_environ(&raw))
}

fn parse_environ(raw: &[u8]) -> Vec<(String, String)> {
    raw.split(|b| *b == 0)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let entry = String::from_utf8_lossy(entry);
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environ_is_split_on_nul() {
        let env = parse_environ(b"PATH=/bin\0HOME=/root\0EMPTY=\0junk\0");
        assert_eq!(
            env,
            vec![
                ("PATH".to_string(), "/bin".to_string()),
                ("HOME".to_string(), "/root".to_string()),
                ("EMPTY".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn own_environment_is_readable() {
        let env = process_environ(std::process::id()).unwrap();
        assert!(!env.is_empty());
    }

    #[test]
    fn empty_command_is_rejected() {
        let err = exec_in_container(std::process::id(), &[]).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }
}
