use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::process::Command;

use bstr::{ByteSlice, ByteVec};

use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Argument(OsString);

impl serde::Serialize for Argument {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // This actually adds an extra, pointless layer of escaping, but it's
        // better than replacing unknown characters with \uFFFD.
        let bytes = <[u8]>::from_os_str(&self.0).ok_or_else(|| {
            <S::Error as serde::ser::Error>::custom("could not encode the argument")
        })?;
        serializer.serialize_str(&bytes.escape_bytes().collect::<String>())
    }
}

impl<'de> serde::Deserialize<'de> for Argument {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // This reverses the extra layer of escaping above.
        let result = String::deserialize(deserializer)?;
        Vec::<u8>::unescape_bytes(result)
            .into_os_string()
            .map(Self)
            .map_err(|_| serde::de::Error::custom("could not decode the argument"))
    }
}

impl AsRef<std::ffi::OsStr> for Argument {
    fn as_ref(&self) -> &std::ffi::OsStr {
        &self.0
    }
}

impl std::fmt::Display for Argument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.to_string_lossy().fmt(f)
    }
}

impl From<&OsStr> for Argument {
    fn from(value: &OsStr) -> Self {
        Self(value.to_owned())
    }
}

impl From<OsString> for Argument {
    fn from(value: OsString) -> Self {
        Self(value)
    }
}

impl From<&str> for Argument {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for Argument {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&std::path::Path> for Argument {
    fn from(value: &std::path::Path) -> Self {
        Self(value.into())
    }
}

impl From<std::path::PathBuf> for Argument {
    fn from(value: std::path::PathBuf) -> Self {
        Self(value.into())
    }
}

pub type Environment = BTreeMap<Argument, Argument>;

/// An external command, such as a database dump or a call to `sc.exe`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Program {
    pub command: Argument,
    #[serde(default)]
    pub arguments: Vec<Argument>,
    #[serde(default)]
    pub environment: Environment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOutput {
    /// `None` if the program was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProgramOutput {
    pub fn succeeded(&self) -> bool {
        self.status == Some(0)
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command)?;
        for argument in &self.arguments {
            write!(f, " {}", argument)?;
        }
        Ok(())
    }
}

impl Program {
    pub fn new(
        command: impl Into<Argument>,
        arguments: impl IntoIterator<Item = impl Into<Argument>>,
    ) -> Self {
        Self {
            command: command.into(),
            arguments: arguments.into_iter().map(Into::into).collect(),
            environment: Environment::new(),
        }
    }

    /// Runs the program to completion, capturing its output.
    pub fn output(&self) -> ControlResult<ProgramOutput> {
        let output = self
            .command()
            .output()
            .map_err(|error| ControlError::CommandError {
                command: self.to_string(),
                inner: error.into(),
            })?;
        Ok(ProgramOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Runs the program to completion, inheriting our standard streams, and
    /// returns its exit code.
    pub fn run(&self) -> ControlResult<Option<i32>> {
        let status = self
            .command()
            .status()
            .map_err(|error| ControlError::CommandError {
                command: self.to_string(),
                inner: error.into(),
            })?;
        Ok(status.code())
    }

    /// Runs the program and fails unless it exits with status 0.
    pub fn run_successfully(&self) -> ControlResult<ProgramOutput> {
        let output = self.output()?;
        if output.succeeded() {
            Ok(output)
        } else {
            Err(self.failed(&output))
        }
    }

    pub(crate) fn failed(&self, output: &ProgramOutput) -> ControlError {
        let combined = format!("{}{}", output.stdout, output.stderr);
        ControlError::CommandFailed {
            command: self.to_string(),
            status: output.status,
            output: combined.trim().to_owned(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.command);
        command.args(&self.arguments).envs(&self.environment);
        command
    }
}

#[cfg(test)]
mod tests {
    use crate::test_helpers::*;

    use super::*;

    #[cfg(unix)]
    #[test]
    #[ntest::timeout(2000)]
    fn test_capturing_output() -> anyhow::Result<()> {
        let program = Program::new("sh", ["-c", "echo out; echo err >&2; exit 3"]);

        let output = program.output()?;

        test_eq(
            output,
            ProgramOutput {
                status: Some(3),
                stdout: "out\n".to_owned(),
                stderr: "err\n".to_owned(),
            },
        )
    }

    #[cfg(unix)]
    #[test]
    #[ntest::timeout(2000)]
    fn test_environment_variables() -> anyhow::Result<()> {
        let temporary_directory = tempfile::tempdir()?;
        let test_file = temporary_directory.path().join("test.file");

        let program = Program {
            command: "sh".into(),
            arguments: vec!["-c".into(), "echo $INPUT > $TEST_FILE".into()],
            environment: Environment::from([
                ("INPUT".into(), "hello there".into()),
                ("TEST_FILE".into(), test_file.clone().into()),
            ]),
        };
        let status = program.run()?;

        test_eq(status, Some(0))?;
        test_eq(std::fs::read_to_string(&test_file)?.as_str(), "hello there\n")
    }

    #[cfg(unix)]
    #[test]
    #[ntest::timeout(2000)]
    fn test_failing_programs_are_reported() -> anyhow::Result<()> {
        let program = Program::new("sh", ["-c", "echo 'access denied'; exit 5"]);

        match program.run_successfully() {
            Err(ControlError::CommandFailed {
                command,
                status,
                output,
            }) => {
                test_eq(command.as_str(), "sh -c echo 'access denied'; exit 5")?;
                test_eq(status, Some(5))?;
                test_eq(output.as_str(), "access denied")
            }
            other => anyhow::bail!("Expected a command failure, got {:?}", other),
        }
    }

    #[test]
    #[ntest::timeout(2000)]
    fn test_missing_programs_are_reported() -> anyhow::Result<()> {
        let program = Program::new("this-program-does-not-exist-anywhere", Vec::<String>::new());

        match program.output() {
            Err(ControlError::CommandError { command, .. }) => {
                test_eq(command.as_str(), "this-program-does-not-exist-anywhere")
            }
            other => anyhow::bail!("Expected a launch failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_serializing_an_argument() -> anyhow::Result<()> {
        use std::os::unix::prelude::OsStrExt;

        let argument = Argument::from(OsStr::from_bytes(b"/path/to\x01/command"));

        let serialized = serde_json::to_string(&argument)?;

        assert_eq!(serialized, "\"/path/to\\\\x01/command\"");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_deserializing_an_argument() -> anyhow::Result<()> {
        use std::os::unix::prelude::OsStrExt;

        let serialized = "\"wibble.\\\\xFF.wobble\"";

        let deserialized: Argument = serde_json::from_str(serialized)?;

        assert_eq!(
            deserialized,
            Argument::from(OsStr::from_bytes(b"wibble.\xFF.wobble"))
        );
        Ok(())
    }
}
