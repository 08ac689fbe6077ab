//! Error types for the crawl and dispatch pipelines.
//!
//! Fetch-side errors distinguish retryable causes (transport faults, bad
//! statuses, verification challenge pages) from terminal ones (unparseable
//! URLs, an exhausted retry budget). Scheduler errors distinguish the
//! aggregate validation report from the fail-fast execution failure.

use std::path::PathBuf;
use std::process::ExitStatus;

use reqwest::StatusCode;
use thiserror::Error;

use crate::scheduler::Stage;

/// Failures raised while fetching a single URL.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The input never reached the network: it does not parse as an
    /// absolute URL with a scheme and a host.
    #[error("invalid URL `{0}`")]
    InvalidUrl(String),

    /// Connection, DNS, TLS, timeout, or body-read failure.
    #[error("transport error for `{url}`: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code.
    #[error("HTTP {status} for `{url}`")]
    Status { url: String, status: StatusCode },

    /// HTTP 200 whose body is an anti-automation challenge page rather than
    /// the requested content. Retryable, and never cacheable as a success.
    #[error("verification challenge served for `{url}`")]
    VerificationChallenge { url: String },

    /// The retry budget ran out. Carries the last underlying cause.
    #[error("gave up on `{url}` after {attempts} attempts: {source}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether another attempt at the same URL could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. }
            | FetchError::Status { .. }
            | FetchError::VerificationChallenge { .. } => true,
            FetchError::InvalidUrl(_) | FetchError::Exhausted { .. } => false,
        }
    }
}

/// A search page whose body does not match the source's expected result
/// shape. Tolerated once per pagination run; two in a row end it.
#[derive(Error, Debug)]
#[error("search page does not match the expected result shape")]
pub struct ParseShapeError;

/// Failures reading or writing crawl artifacts and article bundles.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error("I/O failure at `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed artifact `{path}`: {source}")]
    MalformedArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl PersistError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures loading the YAML configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Failures in the stage scheduler.
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// One or more planned stages have no executable on disk. Collected in
    /// aggregate so the operator sees every missing stage at once.
    #[error("{} stage executable(s) missing", stages.len())]
    MissingExecutables { stages: Vec<(Stage, PathBuf)> },

    /// The stage process could not be spawned at all.
    #[error("could not launch stage {stage} from `{path}`: {source}")]
    Launch {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stage exited non-zero; the remaining plan was abandoned.
    #[error("stage {stage} failed ({status})")]
    StageFailed {
        stage: Stage,
        status: ExitStatus,
        stderr: String,
    },
}
