//! Structured subprocess invocation.
//!
//! External tools are described as a program plus an argument list
//! ([`CommandSpec`]) and executed through the [`CommandRunner`] trait. No
//! shell is involved, so there are no quoting or escaping hazards; stderr and
//! stdout are captured as bytes and handed back to the caller, which decides
//! where to log them.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A subprocess invocation: a program and its argument list.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandSpec {
    /// Creates a spec for the given program with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends a single argument.
    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument in the iterator.
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        for arg in args {
            self.args.push(arg.into());
        }
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument list.
    pub fn argv(&self) -> &[OsString] {
        &self.args
    }

    /// Renders the invocation as a single display line for log files.
    ///
    /// Lossy on non-UTF-8 arguments; intended for humans reading logs, not
    /// for re-execution.
    pub fn render(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Exit code, when the process terminated normally.
    pub status: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: Vec<u8>,
}

impl RunOutput {
    /// Returns `true` when the process exited with code zero.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Standard output decoded as text (lossy).
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded as text (lossy).
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Runs external commands to completion and captures their output.
///
/// The production implementation is [`SystemRunner`]. Tests substitute
/// scripted implementations to count invocations or simulate toolchain
/// behavior without spawning processes.
pub trait CommandRunner {
    /// Runs the command, blocking until it exits.
    fn run(&self, spec: &CommandSpec) -> std::io::Result<RunOutput>;
}

/// Executes commands via [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> std::io::Result<RunOutput> {
        let output = Command::new(spec.program())
            .args(spec.argv())
            .stdin(Stdio::null())
            .output()?;
        Ok(RunOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_collects_args() {
        let mut spec = CommandSpec::new("nvcc");
        spec.arg("--version");
        spec.args(["-I", "/usr/include"]);
        assert_eq!(spec.program(), Path::new("nvcc"));
        assert_eq!(spec.argv().len(), 3);
    }

    #[test]
    fn render_joins_program_and_args() {
        let mut spec = CommandSpec::new("nvcc");
        spec.arg("-E").arg("-o").arg("out.cu");
        assert_eq!(spec.render(), "nvcc -E -o out.cu");
    }

    #[test]
    fn success_requires_zero_exit() {
        let ok = RunOutput {
            status: Some(0),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        let failed = RunOutput {
            status: Some(1),
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        let killed = RunOutput {
            status: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
        };
        assert!(ok.success());
        assert!(!failed.success());
        assert!(!killed.success());
    }

    #[test]
    fn output_text_decoding() {
        let out = RunOutput {
            status: Some(0),
            stdout: b"hello".to_vec(),
            stderr: b"warning: x\n".to_vec(),
        };
        assert_eq!(out.stdout_text(), "hello");
        assert_eq!(out.stderr_text(), "warning: x\n");
    }

    #[test]
    fn system_runner_missing_program_errors() {
        let spec = CommandSpec::new("/nonexistent/cuforge-test-binary");
        assert!(SystemRunner.run(&spec).is_err());
    }
}
