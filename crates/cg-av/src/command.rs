//! Builder for executing external tool commands.
//!
//! Three execution modes are offered:
//!
//! - [`ToolCommand::execute`] captures output and never fails on a nonzero
//!   exit; only a failure to start the process is an error.
//! - [`ToolCommand::execute_checked`] turns a nonzero exit into
//!   [`cg_core::Error::EngineExecution`].
//! - [`ToolCommand::execute_with_progress`] additionally asks ffmpeg for
//!   `-progress` telemetry on stdout and reports each block as it arrives.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStdout, Command};

use crate::telemetry::{TelemetryBlock, TelemetryParser};

/// Flags that make ffmpeg write `key=value` progress blocks to stdout.
const PROGRESS_ARGS: [&str; 3] = ["-progress", "pipe:1", "-nostats"];

/// Output captured from a tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; 0 when the process ended without one (e.g. by signal).
    pub code: i32,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Trimmed stderr, or trimmed stdout when stderr is empty.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use cg_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> cg_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("error")
///     .arg("-show_entries").arg("format=duration")
///     .arg("/path/to/video.mp4")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Reconstruct the invocation as a string that can be pasted into a
    /// POSIX shell.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.to_string_lossy().into_owned())
            .chain(self.args.iter().cloned())
            .map(|part| shell_quote(&part))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    fn spawn(&self) -> cg_core::Result<tokio::process::Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        cmd.spawn().map_err(|e| {
            cg_core::Error::EngineUnavailable(format!(
                "failed to spawn {}: {e}",
                self.program_name()
            ))
        })
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Only a failure to start the process is an error. A nonzero exit is
    /// reported through [`ToolOutput::code`].
    pub async fn execute(&self) -> cg_core::Result<ToolOutput> {
        let child = self.spawn()?;
        let output = child.wait_with_output().await?;

        Ok(ToolOutput {
            code: output.status.code().unwrap_or(0),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Execute the command and fail on a nonzero exit.
    ///
    /// # Errors
    ///
    /// Returns [`cg_core::Error::EngineExecution`] carrying
    /// [`ToolCommand::command_line`] and [`ToolOutput::diagnostic`].
    pub async fn execute_checked(&self) -> cg_core::Result<ToolOutput> {
        let output = self.execute().await?;
        self.check(output)
    }

    /// Execute with ffmpeg progress reporting enabled.
    ///
    /// `on_block` is invoked once per completed telemetry block, in order.
    /// Fails like [`ToolCommand::execute_checked`] on a nonzero exit.
    pub async fn execute_with_progress(
        &self,
        mut on_block: impl FnMut(&TelemetryBlock),
    ) -> cg_core::Result<ToolOutput> {
        let mut with_progress = self.clone();
        with_progress.args = PROGRESS_ARGS
            .iter()
            .map(|s| s.to_string())
            .chain(self.args.iter().cloned())
            .collect();

        tracing::debug!("exec: {}", with_progress.command_line());

        let mut child = with_progress.spawn()?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).to_string()
            })
        });

        let read = match child.stdout.take() {
            Some(stdout) => read_telemetry(stdout, &mut on_block).await,
            None => Ok(String::new()),
        };
        let stdout_text = match read {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(
                    tool = %self.program_name(),
                    "stopping tool after stdout read error: {e}"
                );
                // Kills and reaps the child so it cannot outlive the error.
                if let Err(kill_err) = child.kill().await {
                    tracing::debug!("failed to kill {}: {kill_err}", self.program_name());
                }
                return Err(e.into());
            }
        };

        let status = child.wait().await?;
        let stderr_text = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        let output = ToolOutput {
            code: status.code().unwrap_or(0),
            stdout: stdout_text,
            stderr: stderr_text,
        };
        with_progress.check(output)
    }

    fn check(&self, output: ToolOutput) -> cg_core::Result<ToolOutput> {
        if output.success() {
            return Ok(output);
        }
        tracing::debug!(
            tool = %self.program_name(),
            code = output.code,
            "tool exited with nonzero status"
        );
        Err(cg_core::Error::engine_execution(
            self.command_line(),
            output.diagnostic(),
        ))
    }
}

/// Feed stdout to a [`TelemetryParser`] line by line and return the text.
///
/// Bytes that are not valid UTF-8 are replaced rather than treated as an
/// error.
async fn read_telemetry(
    stdout: ChildStdout,
    on_block: &mut impl FnMut(&TelemetryBlock),
) -> std::io::Result<String> {
    let mut reader = BufReader::new(stdout);
    let mut parser = TelemetryParser::new();
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let decoded = String::from_utf8_lossy(&buf);
        let line = decoded.trim_end_matches(|c| c == '\n' || c == '\r');
        if let Some(block) = parser.feed_line(line) {
            on_block(&block);
        }
        text.push_str(line);
        text.push('\n');
    }

    Ok(text)
}

/// Quote `s` for a POSIX shell, leaving plain words untouched.
pub fn shell_quote(s: &str) -> String {
    let is_plain = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '+' | '@' | '%')
        });
    if is_plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
