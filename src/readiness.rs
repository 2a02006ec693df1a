use crate::error::{ConfigError, ConfigResult};
use crate::log;
use crate::retry::RetryBudget;
use crate::timing::Duration;

/// Asks an endpoint whether it's ready. Any error means "not ready".
pub trait Probe {
    /// The response status, or why there wasn't one.
    fn probe(&self) -> Result<u16, String>;

    /// What's being probed, for logging.
    fn target(&self) -> String;
}

impl<P: Probe + ?Sized> Probe for &P {
    fn probe(&self) -> Result<u16, String> {
        (**self).probe()
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

/// Probes with an HTTP GET.
pub struct HttpProbe {
    client: reqwest::blocking::Client,
    uri: reqwest::Url,
}

impl HttpProbe {
    pub fn new(
        uri: &str,
        request_timeout: Duration,
        accept_invalid_certificates: bool,
    ) -> ConfigResult<Self> {
        let uri = reqwest::Url::parse(uri).map_err(|error| ConfigError::InvalidUri {
            uri: uri.to_owned(),
            message: error.to_string(),
        })?;
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from(request_timeout))
            // only the status of the endpoint itself counts
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(accept_invalid_certificates)
            .build()
            .map_err(|error| ConfigError::HttpClient(error.to_string()))?;
        Ok(Self { client, uri })
    }
}

impl Probe for HttpProbe {
    fn probe(&self) -> Result<u16, String> {
        self.client
            .get(self.uri.clone())
            .send()
            .map(|response| response.status().as_u16())
            .map_err(|error| error.to_string())
    }

    fn target(&self) -> String {
        self.uri.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Ready {
    pub attempts: u32,
}

/// The endpoint never confirmed it was ready. Whatever depends on it must
/// not resume without an operator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[error("{target} was not ready after {attempts} attempts")]
pub struct GaveUp {
    pub target: String,
    pub attempts: u32,
}

pub struct ReadinessPoller<'a, P> {
    probe: P,
    budget: RetryBudget,
    logger: &'a log::Logger,
}

impl<'a, P: Probe> ReadinessPoller<'a, P> {
    pub fn new(probe: P, budget: RetryBudget, logger: &'a log::Logger) -> Self {
        Self {
            probe,
            budget,
            logger,
        }
    }

    /// Polls until the endpoint answers with exactly 200.
    pub fn wait_until_ready(&self) -> Result<Ready, GaveUp> {
        let target = self.probe.target();
        log::info!(self.logger, event = "WAIT_READY", target, budget = self.budget);

        for attempt in self.budget.attempts() {
            match self.probe.probe() {
                Ok(200) => {
                    log::info!(self.logger, event = "READY", target, attempt);
                    return Ok(Ready { attempts: attempt });
                }
                Ok(status) => {
                    log::debug!(self.logger, event = "NOT_READY", target, attempt, status);
                }
                Err(error) => {
                    log::debug!(self.logger, event = "NOT_READY", target, attempt, error);
                }
            }

            if self.budget.is_exhausted(attempt) {
                break;
            }
            if self.budget.is_escalating(attempt) {
                log::warning!(
                    self.logger,
                    event = "STILL_WAITING",
                    target,
                    attempt,
                    message = "the remote node is still not ready; an operator should check on it"
                );
            }
            self.budget.pause();
        }

        let gave_up = GaveUp {
            target,
            attempts: self.budget.hard_limit(),
        };
        log::fatal!(self.logger, event = "GAVE_UP", gave_up);
        Err(gave_up)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    use crate::log::LogFormat;
    use crate::test_helpers::*;

    use super::*;

    fn budget(soft_limit: u32, hard_limit: u32) -> RetryBudget {
        RetryBudget::new(Duration::ZERO, soft_limit, hard_limit).unwrap()
    }

    #[test]
    fn test_ready_after_two_unavailable_responses() -> anyhow::Result<()> {
        let (logger, _) = captured_logger(LogFormat::Json);
        let probe = ScriptedProbe::new([Ok(503), Ok(503), Ok(200)]);
        let poller = ReadinessPoller::new(&probe, budget(40, 42), &logger);

        test_eq(poller.wait_until_ready(), Ok(Ready { attempts: 3 }))?;
        test_eq(probe.count(), 3)
    }

    #[test]
    fn test_gives_up_at_exactly_the_hard_limit() -> anyhow::Result<()> {
        let (logger, output) = captured_logger(LogFormat::Json);
        let probe = ScriptedProbe::new([Ok(503)]);
        let poller = ReadinessPoller::new(&probe, budget(2, 4), &logger);

        test_eq(
            poller.wait_until_ready(),
            Err(GaveUp {
                target: "scripted".to_owned(),
                attempts: 4,
            }),
        )?;
        test_eq(probe.count(), 4)?;
        // attempts 2 and 3 warn; attempt 4 gives up
        test_eq(
            output.events()?,
            vec![
                "WAIT_READY".to_owned(),
                "STILL_WAITING".to_owned(),
                "STILL_WAITING".to_owned(),
                "GAVE_UP".to_owned(),
            ],
        )
    }

    #[test]
    fn test_network_errors_and_bad_statuses_are_the_same() -> anyhow::Result<()> {
        let (logger, output) = captured_debug_logger();
        let probe = ScriptedProbe::new([
            Err("connection refused".to_owned()),
            Ok(500),
            Err("dns error: no such host".to_owned()),
            Ok(204),
            Ok(200),
        ]);
        let poller = ReadinessPoller::new(&probe, budget(10, 12), &logger);

        test_eq(poller.wait_until_ready(), Ok(Ready { attempts: 5 }))?;
        test_eq(
            output
                .events()?
                .iter()
                .filter(|event| *event == "NOT_READY")
                .count(),
            4,
        )
    }

    #[test]
    fn test_invalid_uris_are_rejected() {
        let result = HttpProbe::new("not a uri", Duration::QUANTUM, false);
        assert!(matches!(result, Err(ConfigError::InvalidUri { .. })));
    }

    #[test]
    #[ntest::timeout(5000)]
    fn test_probing_over_http() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?;
        let server = thread::spawn(move || -> anyhow::Result<()> {
            for status in ["503 Service Unavailable", "200 OK"] {
                let (mut stream, _) = listener.accept()?;
                let mut buffer = [0; 1024];
                let _ = stream.read(&mut buffer)?;
                write!(
                    stream,
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                )?;
            }
            Ok(())
        });

        let probe = HttpProbe::new(
            &format!("http://{}/api/health", address),
            Duration::of(2, crate::timing::DurationUnit::Seconds),
            false,
        )?;

        test_eq(probe.probe(), Ok(503))?;
        test_eq(probe.probe(), Ok(200))?;
        server.join().unwrap()
    }

    #[test]
    #[ntest::timeout(5000)]
    fn test_redirects_are_not_followed() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let address = listener.local_addr()?;
        let server = thread::spawn(move || -> anyhow::Result<()> {
            let (mut stream, _) = listener.accept()?;
            let mut buffer = [0; 1024];
            let _ = stream.read(&mut buffer)?;
            write!(
                stream,
                "HTTP/1.1 302 Found\r\nLocation: /login\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            )?;
            Ok(())
        });

        let probe = HttpProbe::new(
            &format!("http://{}/api/health", address),
            Duration::of(2, crate::timing::DurationUnit::Seconds),
            false,
        )?;

        test_eq(probe.probe(), Ok(302))?;
        server.join().unwrap()
    }

    #[test]
    #[ntest::timeout(5000)]
    fn test_connection_failures_are_not_ready() -> anyhow::Result<()> {
        // bind and drop, so nothing is listening on the port
        let address = TcpListener::bind("127.0.0.1:0")?.local_addr()?;
        let probe = HttpProbe::new(
            &format!("http://{}/", address),
            Duration::of(1, crate::timing::DurationUnit::Seconds),
            false,
        )?;

        assert!(probe.probe().is_err(), "Expected the connection to fail.");
        Ok(())
    }
}
