//! Windows services, through `sc.exe`, `tasklist` and `taskkill`.

use crate::error::{ControlError, ControlResult};
use crate::services::programs::{Program, ProgramOutput};
use crate::services::{Pid, ProcessState, ServiceManager, StartupMode};

/// `sc stop` on a service that is not running.
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;
/// `taskkill` on a process that does not exist.
const TASKKILL_NOT_FOUND: i32 = 128;

pub struct ServiceControlManager;

impl ServiceManager for ServiceControlManager {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()> {
        set_startup_mode_command(service, mode).run_successfully()?;
        Ok(())
    }

    fn issue_stop(&self, service: &str) -> ControlResult<()> {
        let program = Program::new("sc.exe", ["stop", service]);
        let output = program.output()?;
        accept(&program, &output, ERROR_SERVICE_NOT_ACTIVE)
    }

    fn issue_start(&self, service: &str) -> ControlResult<i32> {
        let program = Program::new("sc.exe", ["start", service]);
        let output = program.output()?;
        output.status.ok_or_else(|| program.failed(&output))
    }

    fn find_process(&self, process: &str) -> ControlResult<ProcessState> {
        let program = find_process_command(process);
        let output = program.run_successfully()?;
        parse_tasklist(&output.stdout).ok_or_else(|| ControlError::UnexpectedOutput {
            command: program.to_string(),
            output: output.stdout.trim().to_owned(),
        })
    }

    fn force_terminate(&self, process_id: Pid) -> ControlResult<()> {
        let program = Program::new("taskkill.exe", ["/F", "/PID", &process_id.to_string()]);
        let output = program.output()?;
        accept(&program, &output, TASKKILL_NOT_FOUND)
    }
}

/// Succeeds on status 0 and on the status that means there was nothing to do.
fn accept(program: &Program, output: &ProgramOutput, already_done: i32) -> ControlResult<()> {
    match output.status {
        Some(0) => Ok(()),
        Some(status) if status == already_done => Ok(()),
        _ => Err(program.failed(output)),
    }
}

fn set_startup_mode_command(service: &str, mode: StartupMode) -> Program {
    let start_type = match mode {
        StartupMode::Automatic => "auto",
        StartupMode::Disabled => "disabled",
    };
    // `sc` insists on the space after `start=`, so it's a separate argument
    Program::new("sc.exe", ["config", service, "start=", start_type])
}

fn find_process_command(process: &str) -> Program {
    let filter = format!("IMAGENAME eq {}", process);
    Program::new("tasklist.exe", ["/FI", &filter, "/FO", "CSV", "/NH"])
}

/// Parses `tasklist /FO CSV /NH` output. With no matches, `tasklist` prints an
/// informational line instead of CSV, worded in the system's language, so
/// anything that isn't a quoted row is skipped.
fn parse_tasklist(output: &str) -> Option<ProcessState> {
    let mut process_ids = Vec::new();
    for line in output.lines().map(str::trim) {
        let Some(row) = line.strip_prefix('"') else {
            continue;
        };
        let columns = row.strip_suffix('"')?.split("\",\"").collect::<Vec<_>>();
        let process_id = columns.get(1)?.parse::<Pid>().ok()?;
        process_ids.push(process_id);
    }
    if process_ids.is_empty() {
        Some(ProcessState::Absent)
    } else {
        Some(ProcessState::Present(process_ids))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::*;

    use super::*;

    #[test]
    fn test_parsing_running_processes() -> anyhow::Result<()> {
        let output = "\r\n\"AnalyticsServer.exe\",\"4312\",\"Services\",\"0\",\"812,404 K\"\r\n\"AnalyticsServer.exe\",\"5120\",\"Services\",\"0\",\"1,024 K\"\r\n";

        test_eq(
            parse_tasklist(output),
            Some(ProcessState::Present(vec![4312, 5120])),
        )
    }

    #[test]
    fn test_parsing_no_processes() -> anyhow::Result<()> {
        let output = "INFO: No tasks are running which match the specified criteria.\r\n";

        test_eq(parse_tasklist(output), Some(ProcessState::Absent))
    }

    #[test]
    fn test_parsing_no_processes_in_another_language() -> anyhow::Result<()> {
        let output = "INFORMATION: Es werden keine Aufgaben mit den angegebenen Kriterien ausgeführt.\r\n";

        test_eq(parse_tasklist(output), Some(ProcessState::Absent))
    }

    #[test]
    fn test_rejecting_malformed_rows() -> anyhow::Result<()> {
        test_eq(parse_tasklist("\"AnalyticsServer.exe\",\"pid\"\r\n"), None)?;
        test_eq(parse_tasklist("\"AnalyticsServer.exe\",\"4312\r\n"), None)
    }

    fn exited_with(status: Option<i32>) -> ProgramOutput {
        ProgramOutput {
            status,
            stdout: String::new(),
            stderr: "something went wrong".to_owned(),
        }
    }

    #[test]
    fn test_stopping_a_service_that_is_not_running_succeeds() -> anyhow::Result<()> {
        let program = Program::new("sc.exe", ["stop", "Analytics"]);

        test_eq(accept(&program, &exited_with(Some(0)), ERROR_SERVICE_NOT_ACTIVE), Ok(()))?;
        test_eq(accept(&program, &exited_with(Some(1062)), ERROR_SERVICE_NOT_ACTIVE), Ok(()))?;
        test_eq(
            accept(&program, &exited_with(Some(5)), ERROR_SERVICE_NOT_ACTIVE),
            Err(ControlError::CommandFailed {
                command: "sc.exe stop Analytics".to_owned(),
                status: Some(5),
                output: "something went wrong".to_owned(),
            }),
        )
    }

    #[test]
    fn test_terminating_a_process_that_does_not_exist_succeeds() -> anyhow::Result<()> {
        let program = Program::new("taskkill.exe", ["/F", "/PID", "4312"]);

        test_eq(accept(&program, &exited_with(Some(128)), TASKKILL_NOT_FOUND), Ok(()))?;
        test_eq(accept(&program, &exited_with(Some(1062)), TASKKILL_NOT_FOUND).is_err(), true)?;
        test_eq(accept(&program, &exited_with(None), TASKKILL_NOT_FOUND).is_err(), true)
    }

    #[test]
    fn test_setting_the_startup_mode() -> anyhow::Result<()> {
        test_eq(
            set_startup_mode_command("Analytics", StartupMode::Disabled).to_string(),
            "sc.exe config Analytics start= disabled".to_owned(),
        )?;
        test_eq(
            set_startup_mode_command("Analytics", StartupMode::Automatic).to_string(),
            "sc.exe config Analytics start= auto".to_owned(),
        )
    }

    #[test]
    fn test_filtering_processes_by_image_name() -> anyhow::Result<()> {
        test_eq(
            find_process_command("AnalyticsServer.exe").to_string(),
            "tasklist.exe /FI IMAGENAME eq AnalyticsServer.exe /FO CSV /NH".to_owned(),
        )
    }
}
