pub mod programs;
#[cfg(unix)]
pub mod systemd;
pub mod windows;

pub use programs::*;

use crate::error::ControlResult;

pub type Pid = u32;

/// A named OS service and the image name of the process that backs it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServiceHandle {
    pub name: String,
    pub process: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StartupMode {
    Automatic,
    Disabled,
}

impl std::fmt::Display for StartupMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "automatic"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProcessState {
    Absent,
    Present(Vec<Pid>),
}

/// The operations the lifecycle controller needs from the OS service manager.
///
/// A failed `find_process` means the state is unknown, not that the process
/// is gone.
pub trait ServiceManager {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()>;

    /// Asks the service to stop. Returning does not mean the process has exited.
    fn issue_stop(&self, service: &str) -> ControlResult<()>;

    /// Returns the exit code of the start command.
    fn issue_start(&self, service: &str) -> ControlResult<i32>;

    fn find_process(&self, process: &str) -> ControlResult<ProcessState>;

    /// Succeeds if the process no longer exists.
    fn force_terminate(&self, process_id: Pid) -> ControlResult<()>;
}

impl<M: ServiceManager + ?Sized> ServiceManager for &M {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()> {
        (**self).set_startup_mode(service, mode)
    }

    fn issue_stop(&self, service: &str) -> ControlResult<()> {
        (**self).issue_stop(service)
    }

    fn issue_start(&self, service: &str) -> ControlResult<i32> {
        (**self).issue_start(service)
    }

    fn find_process(&self, process: &str) -> ControlResult<ProcessState> {
        (**self).find_process(process)
    }

    fn force_terminate(&self, process_id: Pid) -> ControlResult<()> {
        (**self).force_terminate(process_id)
    }
}

impl<M: ServiceManager + ?Sized> ServiceManager for Box<M> {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()> {
        (**self).set_startup_mode(service, mode)
    }

    fn issue_stop(&self, service: &str) -> ControlResult<()> {
        (**self).issue_stop(service)
    }

    fn issue_start(&self, service: &str) -> ControlResult<i32> {
        (**self).issue_start(service)
    }

    fn find_process(&self, process: &str) -> ControlResult<ProcessState> {
        (**self).find_process(process)
    }

    fn force_terminate(&self, process_id: Pid) -> ControlResult<()> {
        (**self).force_terminate(process_id)
    }
}

/// The service manager for the platform we're running on.
pub fn native() -> Box<dyn ServiceManager> {
    #[cfg(unix)]
    {
        Box::new(systemd::Systemd)
    }
    #[cfg(not(unix))]
    {
        Box::new(windows::ServiceControlManager)
    }
}
