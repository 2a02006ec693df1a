use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;

use crate::config::{Config, ReadinessConfig};
use crate::lifecycle::ServiceLifecycleController;
use crate::log::{self, LogFormat, Logger, Severity};
use crate::maintenance::MaintenanceWindow;
use crate::readiness::{HttpProbe, ReadinessPoller};
use crate::resolve;
use crate::services::{self, Program, ServiceHandle};
use crate::timing::Duration;
use crate::wait::WaitFor;

/// The operator asked for something that failed and needs their attention.
const EXIT_FAILURE: u8 = 1;
/// A bounded wait ran out; automatic handling has stopped.
const EXIT_FATAL: u8 = 2;

#[derive(Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    #[command(subcommand)]
    command: Command,
    /// A RON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    service: Option<String>,
    /// The image name of the process backing the service.
    #[arg(long)]
    process: Option<String>,
    /// The host name to put in log records.
    #[arg(long)]
    host: Option<String>,
    #[arg(long = "log-format")]
    log_format: Option<LogFormat>,
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Disable and stop the service, waiting for its process to exit.
    Stop,
    /// Enable and start the service.
    Start,
    /// Poll a readiness endpoint until it answers 200.
    WaitReady {
        #[arg(long)]
        uri: Option<String>,
    },
    /// Stop the service, run a payload, wait, and start the service.
    Maintain {
        /// Wait for this readiness endpoint before starting again.
        #[arg(long = "wait-for", conflicts_with = "wait_time")]
        wait_for: Option<String>,
        /// Wait this long before starting again.
        #[arg(long = "wait-time")]
        wait_time: Option<Duration>,
        /// The payload command, after `--`.
        #[arg(last = true)]
        payload: Vec<String>,
    },
    /// Resolve host names in parallel, with a collective deadline.
    Resolve {
        #[arg(long, default_value = "10s")]
        deadline: Duration,
        #[arg(required = true)]
        hosts: Vec<String>,
    },
}

pub fn run(arguments: Arguments) -> anyhow::Result<ExitCode> {
    let config = match &arguments.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Could not load the configuration from {:?}", path))?,
        None => Config::default(),
    };
    let logger = logger(&arguments, &config)?;

    match arguments.command {
        Command::Stop => {
            let controller = controller(&arguments, &config, &logger)?;
            Ok(match controller.stop() {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::from(EXIT_FATAL),
            })
        }
        Command::Start => {
            let controller = controller(&arguments, &config, &logger)?;
            Ok(match controller.start() {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::from(EXIT_FAILURE),
            })
        }
        Command::WaitReady { ref uri } => {
            let readiness = readiness(uri.as_deref(), &config)?
                .context("No readiness URI; use --uri or the configuration file")?;
            let poller = ReadinessPoller::new(
                readiness.probe()?,
                readiness.budget()?,
                &logger,
            );
            Ok(match poller.wait_until_ready() {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::from(EXIT_FATAL),
            })
        }
        Command::Maintain {
            ref wait_for,
            wait_time,
            ref payload,
        } => {
            let controller = controller(&arguments, &config, &logger)?;
            let payload = match payload.split_first() {
                Some((command, payload_arguments)) => {
                    Some(Program::new(command.as_str(), payload_arguments.iter().cloned()))
                }
                None => config.payload.clone(),
            };
            let readiness = readiness(wait_for.as_deref(), &config)?;
            let wait: WaitFor<HttpProbe> = match (wait_time, readiness) {
                (Some(duration), _) => WaitFor::Time(duration),
                (None, Some(readiness)) => WaitFor::Ready(ReadinessPoller::new(
                    readiness.probe()?,
                    readiness.budget()?,
                    &logger,
                )),
                (None, None) => WaitFor::None,
            };
            let window = MaintenanceWindow::new(controller, payload, wait, &logger);
            match window.run() {
                Ok(report) => {
                    log::info!(logger, event = "MAINTENANCE_COMPLETE", report);
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    let message = error.to_string();
                    if error.is_fatal() {
                        log::fatal!(logger, event = "MAINTENANCE_ABANDONED", error, message);
                        Ok(ExitCode::from(EXIT_FATAL))
                    } else {
                        log::error!(logger, event = "MAINTENANCE_FAILED", error, message);
                        Ok(ExitCode::from(EXIT_FAILURE))
                    }
                }
            }
        }
        Command::Resolve {
            deadline,
            ref hosts,
        } => {
            let report = resolve::resolve_all(hosts, deadline, resolve::system_resolver, &logger);
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(if report.is_complete() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_FAILURE)
            })
        }
    }
}

fn logger(arguments: &Arguments, config: &Config) -> anyhow::Result<Logger> {
    let host = arguments
        .host
        .clone()
        .or_else(|| config.host.clone())
        .unwrap_or_else(detect_host);
    let format = arguments
        .log_format
        .or(config.log.format)
        .unwrap_or_else(LogFormat::detect);
    let minimum = if arguments.verbose {
        Severity::Debug
    } else {
        config.log.level
    };
    let logger = match arguments.log_file.as_ref().or(config.log.path.as_ref()) {
        Some(path) => Logger::to_file(host, format, path)
            .with_context(|| format!("Could not open the log file {:?}", path))?,
        None => Logger::to_stderr(host, format),
    };
    Ok(logger.with_minimum(minimum))
}

fn controller<'a>(
    arguments: &Arguments,
    config: &Config,
    logger: &'a Logger,
) -> anyhow::Result<ServiceLifecycleController<'a, Box<dyn services::ServiceManager>>> {
    let configured = config.service.as_ref();
    let name = arguments
        .service
        .clone()
        .or_else(|| configured.map(|service| service.name.clone()))
        .context("No service name; use --service or the configuration file")?;
    let process = arguments
        .process
        .clone()
        .or_else(|| configured.map(|service| service.process.clone()))
        .context("No process name; use --process or the configuration file")?;
    let budget = config
        .stop
        .budget()
        .context("Invalid stop configuration")?;
    Ok(ServiceLifecycleController::new(
        ServiceHandle { name, process },
        services::native(),
        budget,
        logger,
    ))
}

/// A URI on the command line overrides the configured one, keeping the
/// configured timings.
fn readiness(uri: Option<&str>, config: &Config) -> anyhow::Result<Option<ReadinessConfig>> {
    Ok(match (uri, &config.readiness) {
        (Some(uri), Some(configured)) => Some(ReadinessConfig {
            uri: uri.to_owned(),
            ..configured.clone()
        }),
        (Some(uri), None) => Some(ReadinessConfig::new(uri)),
        (None, configured) => configured.clone(),
    })
}

fn detect_host() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_owned())
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "localhost".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use crate::test_helpers::*;

    use super::*;

    #[test]
    fn test_parsing_a_maintenance_command() -> anyhow::Result<()> {
        let arguments = Arguments::try_parse_from([
            "servicewindow",
            "--service",
            "AnalyticsServer",
            "maintain",
            "--wait-for",
            "https://primary.corp/api/health",
            "--",
            "pg_dump",
            "-f",
            "analytics.sql",
        ])?;

        match arguments.command {
            Command::Maintain {
                wait_for,
                wait_time,
                payload,
            } => {
                test_eq(wait_for.as_deref(), Some("https://primary.corp/api/health"))?;
                test_eq(wait_time, None)?;
                test_eq(
                    payload,
                    vec![
                        "pg_dump".to_owned(),
                        "-f".to_owned(),
                        "analytics.sql".to_owned(),
                    ],
                )
            }
            other => anyhow::bail!("Expected a maintenance command, got {:?}", other),
        }
    }

    #[test]
    fn test_waiting_for_both_a_time_and_an_endpoint_is_rejected() {
        let result = Arguments::try_parse_from([
            "servicewindow",
            "maintain",
            "--wait-for",
            "https://primary.corp/api/health",
            "--wait-time",
            "5m",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_a_command_line_uri_keeps_the_configured_timings() -> anyhow::Result<()> {
        let config = Config::parse(
            r#"(readiness: Some((uri: "https://primary.corp/", poll_interval: "1s")))"#,
        )?;

        let readiness = readiness(Some("https://secondary.corp/"), &config)?;

        test_eq(
            readiness,
            Some(ReadinessConfig {
                poll_interval: Duration::of(1, crate::timing::DurationUnit::Seconds),
                ..ReadinessConfig::new("https://secondary.corp/")
            }),
        )
    }

    #[test]
    fn test_the_service_name_is_required() -> anyhow::Result<()> {
        let arguments =
            Arguments::try_parse_from(["servicewindow", "--process", "x.exe", "stop"])?;
        let (logger, _) = captured_logger(LogFormat::Json);

        assert!(controller(&arguments, &Config::default(), &logger).is_err());
        Ok(())
    }
}
