use crate::error::ControlError;
use crate::log;
use crate::retry::RetryBudget;
use crate::services::{Pid, ProcessState, ServiceHandle, ServiceManager, StartupMode};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Stopped {
    pub attempts: u32,
}

/// The backing process outlived the budget. The service is disabled but may
/// still be running; an operator has to take over.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[error("{service} did not stop after {attempts} attempts (last seen as {process_ids:?})")]
pub struct TimedOut {
    pub service: String,
    pub attempts: u32,
    pub process_ids: Vec<Pid>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Started {
    pub exit_code: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[error("{service} did not start: {reason}")]
pub struct StartFailed {
    pub service: String,
    pub reason: StartFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
pub enum StartFailure {
    #[error("the start command exited with {0}")]
    ExitCode(i32),
    #[error(transparent)]
    Control(ControlError),
}

/// Takes a service down and brings it back.
///
/// Stopping waits for the backing process to exit, escalating to a forced
/// termination. Starting only makes sure the start command was accepted; it
/// does not wait for the service to become healthy. Checking that is up to
/// the caller.
pub struct ServiceLifecycleController<'a, M> {
    service: ServiceHandle,
    manager: M,
    budget: RetryBudget,
    logger: &'a log::Logger,
}

impl<'a, M: ServiceManager> ServiceLifecycleController<'a, M> {
    pub fn new(
        service: ServiceHandle,
        manager: M,
        budget: RetryBudget,
        logger: &'a log::Logger,
    ) -> Self {
        Self {
            service,
            manager,
            budget,
            logger,
        }
    }

    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }

    pub fn stop(&self) -> Result<Stopped, TimedOut> {
        let service = &self.service;
        log::info!(self.logger, event = "STOP", service, budget = self.budget);

        // Neither failure is fatal: the process check below decides.
        if let Err(error) = self
            .manager
            .set_startup_mode(&service.name, StartupMode::Disabled)
        {
            log::error!(self.logger, event = "DISABLE", service, error);
        }
        if let Err(error) = self.manager.issue_stop(&service.name) {
            log::error!(self.logger, event = "STOP", service, error);
        }

        let mut process_ids: Vec<Pid> = Vec::new();
        for attempt in self.budget.attempts() {
            match self.manager.find_process(&service.process) {
                Ok(ProcessState::Absent) => {
                    log::info!(self.logger, event = "STOPPED", service, attempt);
                    return Ok(Stopped { attempts: attempt });
                }
                Ok(ProcessState::Present(present)) => {
                    process_ids = present;
                    log::info!(
                        self.logger,
                        event = "WAITING",
                        service,
                        attempt,
                        process_ids
                    );
                }
                Err(error) => {
                    log::warning!(
                        self.logger,
                        event = "PROCESS_STATE_UNKNOWN",
                        service,
                        attempt,
                        error
                    );
                }
            }

            if self.budget.is_exhausted(attempt) {
                break;
            }
            if self.budget.is_escalating(attempt) {
                self.force_terminate(attempt, &process_ids);
            }
            self.budget.pause();
        }

        let timed_out = TimedOut {
            service: service.name.clone(),
            attempts: self.budget.hard_limit(),
            process_ids,
        };
        log::fatal!(self.logger, event = "TIMED_OUT", timed_out);
        Err(timed_out)
    }

    /// Terminates the processes seen on the most recent successful check. They
    /// may have exited since, which counts as success.
    fn force_terminate(&self, attempt: u32, process_ids: &[Pid]) {
        let service = &self.service;
        if process_ids.is_empty() {
            log::warning!(
                self.logger,
                event = "FORCE_TERMINATE",
                service,
                attempt,
                message = "no known process id to terminate"
            );
            return;
        }
        for &process_id in process_ids {
            log::warning!(
                self.logger,
                event = "FORCE_TERMINATE",
                service,
                attempt,
                process_id
            );
            if let Err(error) = self.manager.force_terminate(process_id) {
                log::error!(
                    self.logger,
                    event = "FORCE_TERMINATE",
                    service,
                    attempt,
                    process_id,
                    error
                );
            }
        }
    }

    pub fn start(&self) -> Result<Started, StartFailed> {
        let service = &self.service;
        log::info!(self.logger, event = "START", service);

        if let Err(error) = self
            .manager
            .set_startup_mode(&service.name, StartupMode::Automatic)
        {
            log::error!(self.logger, event = "ENABLE", service, error);
        }

        let failed = |reason: StartFailure| -> Result<Started, StartFailed> {
            let failed = StartFailed {
                service: service.name.clone(),
                reason,
            };
            log::error!(self.logger, event = "START_FAILED", failed);
            Err(failed)
        };
        match self.manager.issue_start(&service.name) {
            Ok(0) => {
                log::info!(self.logger, event = "STARTED", service, exit_code = 0);
                Ok(Started { exit_code: 0 })
            }
            Ok(exit_code) => failed(StartFailure::ExitCode(exit_code)),
            Err(error) => failed(StartFailure::Control(error)),
        }
    }
}
