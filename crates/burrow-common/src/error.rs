//! Unified error types for the Burrow workspace.
//!
//! Every crate returns [`BurrowError`]. Lifecycle operations wrap the
//! failing step with [`StageExt::stage`] so the user sees a single message
//! naming the stage that broke.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A resource with the same key already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Type of the conflicting resource.
        kind: &'static str,
        /// Identifier of the conflicting resource.
        id: String,
    },

    /// The container must be stopped (or removal forced) first.
    #[error("container is running: {name}")]
    ContainerRunning {
        /// Name of the running container.
        name: String,
    },

    /// No free address is left in the subnet.
    #[error("no free address left in subnet {subnet}")]
    AddressExhausted {
        /// Subnet in CIDR notation.
        subnet: String,
    },

    /// A kernel call failed.
    #[error("{stage} failed: {source}")]
    Syscall {
        /// Which step issued the call.
        stage: &'static str,
        /// Error reported by the kernel.
        source: std::io::Error,
    },

    /// An external tool exited unsuccessfully.
    #[error("`{program} {args}` failed: {stderr}")]
    Command {
        /// Program that was run.
        program: String,
        /// Space-joined argument list.
        args: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A lifecycle stage failed.
    #[error("{stage}: {source}")]
    Stage {
        /// Human-readable stage name.
        stage: &'static str,
        /// Error raised inside the stage.
        source: Box<BurrowError>,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BurrowError {
    /// Builds an [`BurrowError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a [`BurrowError::Config`] from any message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Builds a [`BurrowError::Syscall`] from a raw OS error number.
    pub fn syscall(stage: &'static str, errno: i32) -> Self {
        Self::Syscall {
            stage,
            source: std::io::Error::from_raw_os_error(errno),
        }
    }

    /// Returns the innermost error, looking through stage wrappers.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Attaches a stage name to the error side of a [`Result`].
pub trait StageExt<T> {
    /// Wraps an error in [`BurrowError::Stage`].
    ///
    /// # Errors
    ///
    /// Returns the wrapped error if `self` is an error.
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> StageExt<T> for Result<T> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|e| BurrowError::Stage {
            stage,
            source: Box::new(e),
        })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BurrowError>;
