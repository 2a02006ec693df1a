use crate::error::ControlError;
use crate::lifecycle::{ServiceLifecycleController, StartFailed, Started, Stopped, TimedOut};
use crate::log;
use crate::readiness::{GaveUp, HttpProbe, Probe};
use crate::services::{Program, ServiceManager};
use crate::wait::WaitFor;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MaintenanceReport {
    pub stopped: Stopped,
    pub started: Started,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
pub enum PayloadFailure {
    #[error("the payload could not be run: {0}")]
    Launch(ControlError),
    #[error("the payload exited with {0:?}")]
    ExitCode(Option<i32>),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(tag = "code")]
pub enum MaintenanceError {
    /// Nothing after the stop was attempted.
    #[error(transparent)]
    StopTimedOut(TimedOut),
    /// The service was left stopped and disabled.
    #[error("{0}; the service has been left stopped")]
    ReadinessGaveUp(GaveUp),
    #[error(transparent)]
    StartFailed(StartFailed),
    /// The service was started again regardless.
    #[error("{failure} (the service was started again)")]
    PayloadFailed {
        failure: PayloadFailure,
        stopped: Stopped,
        started: Started,
    },
}

impl MaintenanceError {
    /// Whether an operator has to step in before the service is usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StopTimedOut(_) | Self::ReadinessGaveUp(_))
    }
}

/// Stops a service, runs a payload, waits for permission, and starts the
/// service again.
pub struct MaintenanceWindow<'a, M, P = HttpProbe> {
    controller: ServiceLifecycleController<'a, M>,
    payload: Option<Program>,
    wait: WaitFor<'a, P>,
    logger: &'a log::Logger,
}

impl<'a, M: ServiceManager, P: Probe> MaintenanceWindow<'a, M, P> {
    pub fn new(
        controller: ServiceLifecycleController<'a, M>,
        payload: Option<Program>,
        wait: WaitFor<'a, P>,
        logger: &'a log::Logger,
    ) -> Self {
        Self {
            controller,
            payload,
            wait,
            logger,
        }
    }

    pub fn run(&self) -> Result<MaintenanceReport, MaintenanceError> {
        let stopped = self
            .controller
            .stop()
            .map_err(MaintenanceError::StopTimedOut)?;

        let payload_failure = self
            .payload
            .as_ref()
            .and_then(|payload| self.run_payload(payload));

        self.wait
            .block_until_ready(self.logger)
            .map_err(MaintenanceError::ReadinessGaveUp)?;

        let started = self
            .controller
            .start()
            .map_err(MaintenanceError::StartFailed)?;

        match payload_failure {
            Some(failure) => Err(MaintenanceError::PayloadFailed {
                failure,
                stopped,
                started,
            }),
            None => Ok(MaintenanceReport { stopped, started }),
        }
    }

    fn run_payload(&self, payload: &Program) -> Option<PayloadFailure> {
        let command = payload.to_string();
        log::info!(self.logger, event = "PAYLOAD", command);
        let failure = match payload.run() {
            Ok(Some(0)) => None,
            Ok(exit_code) => Some(PayloadFailure::ExitCode(exit_code)),
            Err(error) => Some(PayloadFailure::Launch(error)),
        };
        match &failure {
            None => log::info!(self.logger, event = "PAYLOAD_COMPLETE", command),
            Some(failure) => log::error!(self.logger, event = "PAYLOAD_FAILED", command, failure),
        }
        failure
    }
}
