//! Error types for tower generation.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while generating a temperature tower.
#[derive(Error, Debug)]
pub enum TowerError {
    /// Invalid numeric input or settings.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A template or model file is absent from the template directory.
    #[error("missing template file: {}", path.display())]
    MissingTemplateFile {
        /// Expected location of the file.
        path: PathBuf,
    },

    /// Template could not be read.
    #[error("failed to read {}", path.display())]
    Read {
        /// File being read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Output file could not be created or written.
    #[error("failed to write {}", path.display())]
    Write {
        /// File being written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The geometry compiler could not be started.
    #[error("failed to run `{program}`")]
    CompilerSpawn {
        /// Program that was invoked.
        program: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The geometry compiler exited unsuccessfully.
    #[error("`{program}` failed ({}){}", describe_code(.code), describe_stderr(.stderr))]
    ExternalToolFailure {
        /// Program that was invoked.
        program: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Tail of the captured standard error.
        stderr: String,
    },

    /// The geometry compiler did not finish in time and was killed.
    #[error("`{program}` timed out after {timeout:?}")]
    CompilerTimeout {
        /// Program that was invoked.
        program: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".into(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

/// Result type for tower operations.
pub type Result<T> = std::result::Result<T, TowerError>;
