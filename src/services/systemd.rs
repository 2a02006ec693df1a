//! systemd units, through `systemctl`, the process table and `kill(2)`.

use std::ffi::OsStr;
use std::path::Path;

use crate::error::{ControlError, ControlResult};
use crate::services::programs::Program;
use crate::services::{Pid, ProcessState, ServiceManager, StartupMode};

pub struct Systemd;

impl ServiceManager for Systemd {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()> {
        let action = match mode {
            StartupMode::Automatic => "enable",
            StartupMode::Disabled => "disable",
        };
        Program::new("systemctl", [action, service]).run_successfully()?;
        Ok(())
    }

    fn issue_stop(&self, service: &str) -> ControlResult<()> {
        // we poll for the process ourselves, so don't let systemctl block
        Program::new("systemctl", ["stop", "--no-block", service]).run_successfully()?;
        Ok(())
    }

    fn issue_start(&self, service: &str) -> ControlResult<i32> {
        let program = Program::new("systemctl", ["start", service]);
        let output = program.output()?;
        output.status.ok_or_else(|| program.failed(&output))
    }

    fn find_process(&self, process: &str) -> ControlResult<ProcessState> {
        let mut system = sysinfo::System::new();
        system.refresh_processes();
        let process_ids = system
            .processes()
            .values()
            .filter(|candidate| {
                is_image(
                    process,
                    candidate.name(),
                    candidate.exe(),
                    candidate.cmd().first().map(String::as_str),
                )
            })
            .map(|candidate| candidate.pid().as_u32());
        Ok(process_state(process_ids))
    }

    fn force_terminate(&self, process_id: Pid) -> ControlResult<()> {
        let raw_process_id = i32::try_from(process_id).map_err(|_| ControlError::TerminateError {
            process_id,
            inner: std::io::Error::from(std::io::ErrorKind::InvalidInput).into(),
        })?;
        match nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(raw_process_id),
            nix::sys::signal::Signal::SIGKILL,
        ) {
            Ok(()) => Ok(()),
            Err(nix::errno::Errno::ESRCH) => Ok(()), // the process was already stopped
            Err(error) => Err(ControlError::TerminateError {
                process_id,
                inner: std::io::Error::from_raw_os_error(error as i32).into(),
            }),
        }
    }
}

/// The kernel truncates the process name to 15 bytes, so the executable and
/// the first argument are compared by their full file names too.
fn is_image(image: &str, name: &str, exe: Option<&Path>, first_argument: Option<&str>) -> bool {
    let file_name_is_image = |path: &Path| path.file_name() == Some(OsStr::new(image));
    name == image
        || exe.map_or(false, file_name_is_image)
        || first_argument.map_or(false, |argument| file_name_is_image(Path::new(argument)))
}

fn process_state(process_ids: impl Iterator<Item = Pid>) -> ProcessState {
    let mut process_ids = process_ids.collect::<Vec<_>>();
    process_ids.sort_unstable();
    process_ids.dedup();
    if process_ids.is_empty() {
        ProcessState::Absent
    } else {
        ProcessState::Present(process_ids)
    }
}
