use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the hook installer
#[derive(Debug, Error)]
pub enum InstallError {
    /// The tracked hook file (or pattern) matched nothing on disk
    #[error("hook source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// The hook source exists but could not be read
    #[error("cannot read hook source {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Two sources would be installed under the same hook name
    #[error(
        "hook sources {} and {} both install to {}",
        first.display(),
        second.display(),
        destination.display()
    )]
    DuplicateDestination {
        destination: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    /// The hooks directory or the installed file could not be written
    #[error("cannot write hook destination {}: {source}", path.display())]
    DestinationUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl InstallError {
    pub fn unwritable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        InstallError::DestinationUnwritable {
            path: path.into(),
            source,
        }
    }
}

/// Failures while planning or running lifecycle stages
#[derive(Debug, Error)]
pub enum StageError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error("stage '{0}' is built in and cannot run commands")]
    BuiltinStage(String),

    #[error("dependency cycle between stages: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("stage '{stage}': command `{command}` failed ({status})")]
    CommandFailed {
        stage: String,
        command: String,
        status: String,
    },

    #[error("stage '{stage}': could not spawn `{command}`: {source}")]
    Spawn {
        stage: String,
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("stage '{stage}' failed")]
    Install {
        stage: String,
        #[source]
        source: InstallError,
    },
}
