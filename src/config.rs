use std::path::{Path, PathBuf};

use crate::error::ConfigResult;
use crate::log::{LogFormat, Severity};
use crate::readiness::HttpProbe;
use crate::retry::RetryBudget;
use crate::services::{Program, ServiceHandle};
use crate::timing::{Duration, DurationUnit};

/// The configuration file, in RON.
///
/// ```ron
/// (
///     host: Some("ANALYTICS-01"),
///     service: Some((name: "AnalyticsServer", process: "AnalyticsServer.exe")),
///     stop: (poll_interval: "5s", escalate_after: "100s", give_up_after: "110s"),
///     readiness: Some((uri: "https://primary.corp/api/health")),
///     payload: Some((command: "pg_dump.exe", arguments: ["-f", "D:\\dumps\\analytics.sql"])),
///     log: (format: Some(json), path: Some("D:\\logs\\maintenance.log")),
/// )
/// ```
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: Option<String>,
    pub service: Option<ServiceHandle>,
    pub stop: StopConfig,
    pub readiness: Option<ReadinessConfig>,
    pub payload: Option<Program>,
    pub log: LogConfig,
}

impl Config {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> ConfigResult<Self> {
        Ok(ron::from_str(contents)?)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StopConfig {
    pub poll_interval: Duration,
    /// When to start force-terminating the backing process.
    pub escalate_after: Duration,
    pub give_up_after: Duration,
}

impl Default for StopConfig {
    fn default() -> Self {
        // 20 polls, then 2 more after the first forced termination
        Self {
            poll_interval: Duration::of(5, DurationUnit::Seconds),
            escalate_after: Duration::of(100, DurationUnit::Seconds),
            give_up_after: Duration::of(110, DurationUnit::Seconds),
        }
    }
}

impl StopConfig {
    pub fn budget(&self) -> ConfigResult<RetryBudget> {
        RetryBudget::from_durations(self.poll_interval, self.escalate_after, self.give_up_after)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    pub uri: String,
    #[serde(default = "defaults::readiness_poll_interval")]
    pub poll_interval: Duration,
    /// When to start advising an operator to check on the remote process.
    #[serde(default = "defaults::readiness_warn_after")]
    pub warn_after: Duration,
    #[serde(default = "defaults::readiness_give_up_after")]
    pub give_up_after: Duration,
    #[serde(default = "defaults::request_timeout")]
    pub request_timeout: Duration,
    #[serde(default)]
    pub accept_invalid_certificates: bool,
}

impl ReadinessConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            poll_interval: defaults::readiness_poll_interval(),
            warn_after: defaults::readiness_warn_after(),
            give_up_after: defaults::readiness_give_up_after(),
            request_timeout: defaults::request_timeout(),
            accept_invalid_certificates: false,
        }
    }

    pub fn budget(&self) -> ConfigResult<RetryBudget> {
        RetryBudget::from_durations(self.poll_interval, self.warn_after, self.give_up_after)
    }

    pub fn probe(&self) -> ConfigResult<HttpProbe> {
        HttpProbe::new(
            &self.uri,
            self.request_timeout,
            self.accept_invalid_certificates,
        )
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Detected from the terminal if absent.
    pub format: Option<LogFormat>,
    /// Standard error if absent.
    pub path: Option<PathBuf>,
    pub level: Severity,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: None,
            path: None,
            level: Severity::Info,
        }
    }
}

mod defaults {
    use crate::timing::{Duration, DurationUnit};

    // 40 polls before the advisory, giving up 2 polls later
    pub fn readiness_poll_interval() -> Duration {
        Duration::of(15, DurationUnit::Seconds)
    }

    pub fn readiness_warn_after() -> Duration {
        Duration::of(10, DurationUnit::Minutes)
    }

    pub fn readiness_give_up_after() -> Duration {
        Duration::of(630, DurationUnit::Seconds)
    }

    pub fn request_timeout() -> Duration {
        Duration::of(10, DurationUnit::Seconds)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::error::ConfigError;
    use crate::test_helpers::*;

    use super::*;

    #[test]
    fn test_an_empty_file_gives_the_defaults() -> anyhow::Result<()> {
        let config = Config::parse("()")?;

        test_eq(config, Config::default())
    }

    #[test]
    fn test_default_budgets_match_the_reference_limits() -> anyhow::Result<()> {
        let stop = StopConfig::default().budget()?;
        test_eq((stop.soft_limit(), stop.hard_limit()), (20, 22))?;

        let readiness = ReadinessConfig::new("http://primary.corp/").budget()?;
        test_eq((readiness.soft_limit(), readiness.hard_limit()), (40, 42))
    }

    #[test]
    fn test_loading_a_full_file() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"(
                host: Some("ANALYTICS-01"),
                service: Some((name: "AnalyticsServer", process: "AnalyticsServer.exe")),
                stop: (poll_interval: "2s", escalate_after: "1m", give_up_after: "64s"),
                readiness: Some((uri: "https://primary.corp/api/health", accept_invalid_certificates: true)),
                payload: Some((command: "pg_dump", arguments: ["-f", "analytics.sql"])),
                log: (format: Some(text), level: DEBUG),
            )"#
        )?;

        let config = Config::load(file.path())?;

        test_eq(config.host.as_deref(), Some("ANALYTICS-01"))?;
        test_eq(
            config.service,
            Some(ServiceHandle {
                name: "AnalyticsServer".to_owned(),
                process: "AnalyticsServer.exe".to_owned(),
            }),
        )?;
        let stop = config.stop.budget()?;
        test_eq((stop.soft_limit(), stop.hard_limit()), (30, 32))?;
        test_eq(
            config.readiness,
            Some(ReadinessConfig {
                accept_invalid_certificates: true,
                ..ReadinessConfig::new("https://primary.corp/api/health")
            }),
        )?;
        test_eq(
            config.payload,
            Some(Program::new("pg_dump", ["-f", "analytics.sql"])),
        )?;
        test_eq(
            config.log,
            LogConfig {
                format: Some(LogFormat::Text),
                path: None,
                level: Severity::Debug,
            },
        )
    }

    #[test]
    fn test_rejecting_unknown_fields() {
        let result = Config::parse(r#"(services: None)"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_rejecting_bad_durations() {
        let result = Config::parse(r#"(stop: (poll_interval: "soon"))"#);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_an_inverted_budget_is_an_error() -> anyhow::Result<()> {
        let config = Config::parse(r#"(stop: (escalate_after: "2m", give_up_after: "1m"))"#)?;

        assert!(matches!(
            config.stop.budget(),
            Err(ConfigError::InvalidLimits { .. })
        ));
        Ok(())
    }
}
