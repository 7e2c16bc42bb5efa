//! Process runner used for every ffmpeg/ffprobe invocation.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::error::ToolError;

/// One external tool call: program, argument list, and how long to wait.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Turns an unsuccessful exit into [`ToolError::NonZeroExit`].
    pub fn into_success(self) -> Result<ToolOutput, ToolError> {
        if self.success {
            Ok(self)
        } else {
            Err(ToolError::NonZeroExit {
                code: self.code,
                stderr: self.stderr,
            })
        }
    }
}

/// Runs external toolchain binaries.
///
/// Implementations return `Ok` for any process that ran to completion, whatever its
/// exit status; callers decide whether a non-zero exit is fatal.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs the invocation to completion or until its timeout elapses.
    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        debug!(
            program = %invocation.program.display(),
            args = ?invocation.args,
            "Running external tool"
        );
        let start = Instant::now();

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ToolError::NotFound {
                        path: invocation.program.clone(),
                    }
                } else {
                    ToolError::Io(e)
                }
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ToolError::Timeout {
                    timeout_secs: invocation.timeout.as_secs(),
                })
            }
        };

        debug!(
            program = %invocation.program.display(),
            code = ?output.status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "External tool finished"
        );

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
