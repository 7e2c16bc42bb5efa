//! Mock tool runner for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::toolchain::{ToolError, ToolInvocation, ToolOutput, ToolRunner};

/// A scripted reply to the next invocation.
#[derive(Debug)]
struct ScriptedResponse {
    result: Result<ToolOutput, ToolError>,
    /// Bytes to write to the invocation's output path before replying.
    output_bytes: Option<usize>,
}

/// Mock implementation of the ToolRunner trait.
///
/// Replies are consumed in FIFO order. Each invocation is recorded for assertions.
/// The mock behaves like ffmpeg on disk where the pipeline depends on it:
/// - an invocation carrying `-pass 1 -passlogfile <prefix>` creates `<prefix>-0.log`
/// - replies queued with [`MockToolRunner::push_success_writing`] write that many bytes
///   to the final argument, unless it is the null sink
///
/// # Example
///
/// ```rust,ignore
/// use fitsize_core::testing::MockToolRunner;
///
/// let runner = MockToolRunner::new();
/// runner.push_success("60.000000\n").await;      // ffprobe
/// runner.push_success("").await;                 // pass 1
/// runner.push_success_writing(5_100_000).await;  // pass 2
///
/// let calls = runner.recorded_invocations().await;
/// ```
#[derive(Debug, Clone)]
pub struct MockToolRunner {
    responses: Arc<RwLock<VecDeque<ScriptedResponse>>>,
    invocations: Arc<RwLock<Vec<ToolInvocation>>>,
}

impl Default for MockToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolRunner {
    /// Create a new mock runner with an empty script.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(VecDeque::new())),
            invocations: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Queue a successful exit with the given stdout.
    pub async fn push_success(&self, stdout: &str) {
        self.push(
            Ok(ToolOutput {
                success: true,
                code: Some(0),
                stdout: stdout.to_string(),
                stderr: String::new(),
            }),
            None,
        )
        .await;
    }

    /// Queue a successful exit that leaves an output file of `bytes` bytes.
    pub async fn push_success_writing(&self, bytes: usize) {
        self.push(
            Ok(ToolOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            }),
            Some(bytes),
        )
        .await;
    }

    /// Queue a non-zero exit with the given stderr.
    pub async fn push_failure(&self, code: i32, stderr: &str) {
        self.push(
            Ok(ToolOutput {
                success: false,
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            None,
        )
        .await;
    }

    /// Queue a non-zero exit that still leaves a partial output file behind.
    pub async fn push_failure_writing(&self, code: i32, stderr: &str, bytes: usize) {
        self.push(
            Ok(ToolOutput {
                success: false,
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_string(),
            }),
            Some(bytes),
        )
        .await;
    }

    /// Queue a runner error such as a missing binary or a timeout.
    pub async fn push_error(&self, error: ToolError) {
        self.push(Err(error), None).await;
    }

    /// Get all recorded invocations.
    pub async fn recorded_invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.read().await.clone()
    }

    /// Get the number of invocations performed.
    pub async fn invocation_count(&self) -> usize {
        self.invocations.read().await.len()
    }

    /// Number of scripted replies not yet consumed.
    pub async fn pending_responses(&self) -> usize {
        self.responses.read().await.len()
    }

    async fn push(&self, result: Result<ToolOutput, ToolError>, output_bytes: Option<usize>) {
        self.responses.write().await.push_back(ScriptedResponse {
            result,
            output_bytes,
        });
    }
}

fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn is_null_sink(arg: &str) -> bool {
    arg == "/dev/null" || arg == "NUL"
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, invocation: &ToolInvocation) -> Result<ToolOutput, ToolError> {
        self.invocations.write().await.push(invocation.clone());

        let scripted = self.responses.write().await.pop_front();
        let Some(scripted) = scripted else {
            return Err(ToolError::Io(std::io::Error::other(format!(
                "no scripted response for {}",
                invocation.program.display()
            ))));
        };

        if scripted.result.is_ok() && arg_after(&invocation.args, "-pass") == Some("1") {
            if let Some(prefix) = arg_after(&invocation.args, "-passlogfile") {
                tokio::fs::write(format!("{}-0.log", prefix), b"frame stats\n").await?;
            }
        }

        if let Some(bytes) = scripted.output_bytes {
            if let Some(output) = invocation.args.last().filter(|a| !is_null_sink(a)) {
                let output = Path::new(output);
                if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(output, vec![0u8; bytes]).await?;
            }
        }

        scripted.result
    }
}
