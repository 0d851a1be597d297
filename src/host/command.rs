use std::process::Command;

use tracing::debug;

use super::HostError;

/// Captured result of an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, the way `stderr=STDOUT` capture reads
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Runs external programs synchronously
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError>;

    /// Run and turn a non-zero exit into [`HostError::CommandFailed`]
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        let output = self.run(program, args)?;
        if output.success() {
            Ok(output)
        } else {
            Err(HostError::CommandFailed {
                command: display_command(program, args),
                code: output.code,
                output: output.combined().trim().to_string(),
            })
        }
    }
}

pub(crate) fn display_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`CommandRunner`] backed by `std::process::Command`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, HostError> {
        debug!(command = %display_command(program, args), "Running command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| HostError::SpawnError {
                command: program.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
