use crate::log::LoggableIoError;
use crate::services::Pid;
use crate::timing::{Duration, DurationParseError};

pub type ControlResult<A> = std::result::Result<A, ControlError>;

/// Failures at the service-manager boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "code")]
pub enum ControlError {
    #[error("could not run {command:?}: {inner}")]
    CommandError {
        command: String,
        inner: LoggableIoError,
    },
    #[error("{command:?} failed with status {status:?}: {output}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },
    #[error("unexpected output from {command:?}: {output}")]
    UnexpectedOutput { command: String, output: String },
    #[error("could not terminate process {process_id}: {inner}")]
    TerminateError {
        process_id: Pid,
        inner: LoggableIoError,
    },
}

pub type ConfigResult<A> = std::result::Result<A, ConfigError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("the poll interval must be greater than zero")]
    ZeroPollInterval,
    #[error("the soft limit ({soft_limit}) must be at least 1 and less than the hard limit ({hard_limit})")]
    InvalidLimits { soft_limit: u32, hard_limit: u32 },
    #[error("{waited} is too long to wait in steps of {poll_interval}")]
    WaitTooLong {
        waited: Duration,
        poll_interval: Duration,
    },
    #[error(transparent)]
    InvalidDuration(#[from] DurationParseError),
    #[error("invalid readiness URI {uri:?}: {message}")]
    InvalidUri { uri: String, message: String },
    #[error("could not construct the HTTP client: {0}")]
    HttpClient(String),
    #[error("could not read the configuration file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("could not parse the configuration file: {0}")]
    ParseError(#[from] ron::error::SpannedError),
    #[error("missing configuration: {0}")]
    Missing(&'static str),
}
