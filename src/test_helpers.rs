#![cfg(test)]

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::error::{ControlError, ControlResult};
use crate::log::{LogFormat, Logger, Severity};
use crate::readiness::Probe;
use crate::services::{Pid, ProcessState, ServiceManager, StartupMode};

pub fn test_eq<A: std::fmt::Debug + PartialEq>(left: A, right: A) -> anyhow::Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "Equality test failed.\n  left:  {:?}\n  right: {:?}\n",
            left,
            right
        ))
    }
}

pub fn fixed_clock() -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339("2023-09-01T00:00:00Z")
        .expect("Invalid test timestamp.")
        .with_timezone(&chrono::Utc)
}

/// Everything written to a captured logger.
#[derive(Clone, Default)]
pub struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

impl CapturedOutput {
    pub fn contents(&self) -> anyhow::Result<String> {
        let buffer = self.0.lock().unwrap();
        Ok(String::from_utf8(buffer.clone())?)
    }

    /// Parses each JSON line.
    pub fn records(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        self.contents()?
            .lines()
            .map(|line| Ok(serde_json::from_str(line)?))
            .collect()
    }

    pub fn events(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .records()?
            .into_iter()
            .filter_map(|record| record["event"].as_str().map(str::to_owned))
            .collect())
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

pub fn captured_logger(format: LogFormat) -> (Logger, CapturedOutput) {
    let output = CapturedOutput::default();
    let logger = Logger::new("test-host", format, Box::new(output.clone())).with_clock(fixed_clock);
    (logger, output)
}

pub fn captured_debug_logger() -> (Logger, CapturedOutput) {
    let (logger, output) = captured_logger(LogFormat::Json);
    (logger.with_minimum(Severity::Debug), output)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    SetStartupMode(String, StartupMode),
    IssueStop(String),
    IssueStart(String),
    FindProcess(String),
    ForceTerminate(Pid),
}

/// A service manager that answers process queries from a script, and records
/// every call made to it. Once the script runs out, the last answer repeats.
pub struct FakeManager {
    states: Mutex<VecDeque<ControlResult<ProcessState>>>,
    start_status: ControlResult<i32>,
    set_startup_mode_result: ControlResult<()>,
    issue_stop_result: ControlResult<()>,
    terminate_result: ControlResult<()>,
    calls: Mutex<Vec<Call>>,
}

impl FakeManager {
    pub fn with_states(states: impl IntoIterator<Item = ControlResult<ProcessState>>) -> Self {
        Self {
            states: Mutex::new(states.into_iter().collect()),
            start_status: Ok(0),
            set_startup_mode_result: Ok(()),
            issue_stop_result: Ok(()),
            terminate_result: Ok(()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_start_status(mut self, start_status: ControlResult<i32>) -> Self {
        self.start_status = start_status;
        self
    }

    pub fn with_set_startup_mode_result(mut self, result: ControlResult<()>) -> Self {
        self.set_startup_mode_result = result;
        self
    }

    pub fn with_issue_stop_result(mut self, result: ControlResult<()>) -> Self {
        self.issue_stop_result = result;
        self
    }

    pub fn with_terminate_result(mut self, result: ControlResult<()>) -> Self {
        self.terminate_result = result;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn query_failure() -> ControlError {
    ControlError::CommandFailed {
        command: "tasklist.exe".to_owned(),
        status: Some(1),
        output: "Access is denied.".to_owned(),
    }
}

impl ServiceManager for FakeManager {
    fn set_startup_mode(&self, service: &str, mode: StartupMode) -> ControlResult<()> {
        self.record(Call::SetStartupMode(service.to_owned(), mode));
        self.set_startup_mode_result.clone()
    }

    fn issue_stop(&self, service: &str) -> ControlResult<()> {
        self.record(Call::IssueStop(service.to_owned()));
        self.issue_stop_result.clone()
    }

    fn issue_start(&self, service: &str) -> ControlResult<i32> {
        self.record(Call::IssueStart(service.to_owned()));
        self.start_status.clone()
    }

    fn find_process(&self, process: &str) -> ControlResult<ProcessState> {
        self.record(Call::FindProcess(process.to_owned()));
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            states.pop_front().unwrap()
        } else {
            states.front().cloned().unwrap_or(Ok(ProcessState::Absent))
        }
    }

    fn force_terminate(&self, process_id: Pid) -> ControlResult<()> {
        self.record(Call::ForceTerminate(process_id));
        self.terminate_result.clone()
    }
}

/// A probe that answers from a script. Once the script runs out, the last
/// answer repeats.
pub struct ScriptedProbe {
    answers: Mutex<VecDeque<Result<u16, String>>>,
    count: Mutex<u32>,
}

impl ScriptedProbe {
    pub fn new(answers: impl IntoIterator<Item = Result<u16, String>>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            count: Mutex::new(0),
        }
    }

    pub fn count(&self) -> u32 {
        *self.count.lock().unwrap()
    }
}

impl Probe for ScriptedProbe {
    fn probe(&self) -> Result<u16, String> {
        *self.count.lock().unwrap() += 1;
        let mut answers = self.answers.lock().unwrap();
        if answers.len() > 1 {
            answers.pop_front().unwrap()
        } else {
            answers
                .front()
                .cloned()
                .unwrap_or_else(|| Err("no answer".to_owned()))
        }
    }

    fn target(&self) -> String {
        "scripted".to_owned()
    }
}
