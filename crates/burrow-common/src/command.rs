//! Runner for the host tools (`ip`, `iptables`, `nsenter`) the runtime
//! drives instead of speaking netlink itself. Tools are resolved on
//! `PATH` before each use.

use std::process::Command;

use crate::error::{BurrowError, Result};

/// Resolves `tool` on `PATH`.
///
/// # Errors
///
/// Returns [`BurrowError::Config`] if the tool is not installed.
pub fn locate(tool: &str) -> Result<String> {
    which::which(tool)
        .map(|path| path.to_string_lossy().into_owned())
        .map_err(|e| BurrowError::config(format!("{tool} not found in PATH: {e}")))
}

/// Locates `tool` and runs it with `args`.
///
/// # Errors
///
/// Returns the lookup error or the error from [`run`].
pub fn run_tool<S: AsRef<str>>(tool: &str, args: &[S]) -> Result<String> {
    run(&locate(tool)?, args)
}

/// Runs `program` with `args` and returns its trimmed standard output.
///
/// # Errors
///
/// Returns [`BurrowError::Io`] if the program cannot be spawned and
/// [`BurrowError::Command`] if it exits unsuccessfully.
pub fn run<S: AsRef<str>>(program: &str, args: &[S]) -> Result<String> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    tracing::debug!(program, args = %args.join(" "), "running host command");

    let output = Command::new(program)
        .args(&args)
        .output()
        .map_err(|e| BurrowError::io(program, e))?;

    if !output.status.success() {
        return Err(BurrowError::Command {
            program: program.to_string(),
            args: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_captures_stdout() {
        let out = run("echo", &["hello", "burrow"]).expect("echo should run");
        assert_eq!(out, "hello burrow");
    }

    #[test]
    fn run_reports_failure_with_program_and_args() {
        let err = run("sh", &["-c", "echo nope >&2; exit 3"]).unwrap_err();
        match err {
            BurrowError::Command {
                program, stderr, ..
            } => {
                assert_eq!(program, "sh");
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn locate_resolves_to_absolute_path() {
        let sh = locate("sh").unwrap();
        assert!(sh.starts_with('/'), "{sh}");
    }

    #[test]
    fn missing_tool_is_config_error() {
        let err = run_tool::<&str>("definitely-not-a-real-binary-burrow", &[]).unwrap_err();
        assert!(matches!(err, BurrowError::Config { .. }));
    }

    #[test]
    fn run_missing_program_is_io_error() {
        let err = run::<&str>("definitely-not-a-real-binary-burrow", &[]).unwrap_err();
        assert!(matches!(err, BurrowError::Io { .. }));
    }
}
