//! External process execution
//!
//! Every tool the harness drives (container engine, sftp client, key
//! generator) goes through [`CommandRunner`]. A non-zero exit is never an
//! error here; callers branch on [`ProcessOutput::exit_code`].

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::OutputMode;
use crate::error::{HarnessError, HarnessResult};

/// One invocation of an external tool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Written to stdin, which is then closed
    pub stdin: Option<String>,
    /// Pipe stdout/stderr back instead of sending them to the output sink
    pub capture: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// Empty unless the command was captured
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> HarnessResult<ProcessOutput>;
}

/// Runs commands on the host with tokio's process support.
pub struct SystemRunner {
    output: OutputMode,
}

impl SystemRunner {
    pub fn new(output: OutputMode) -> Self {
        Self { output }
    }

    fn sink(&self) -> Stdio {
        match self.output {
            OutputMode::Quiet => Stdio::null(),
            OutputMode::Verbose => Stdio::inherit(),
        }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> HarnessResult<ProcessOutput> {
        tracing::debug!("Running: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (k, v) in &spec.env {
            cmd.env(k, v);
        }

        cmd.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if spec.capture {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(self.sink()).stderr(self.sink());
        }

        let mut child = cmd.spawn().map_err(|e| spawn_error(&spec.program, e))?;

        if let (Some(payload), Some(mut stdin)) = (&spec.stdin, child.stdin.take()) {
            // The child may exit before reading everything
            match stdin.write_all(payload.as_bytes()).await {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e.into()),
                _ => {}
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        Ok(ProcessOutput {
            exit_code: exit_code(output.status),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> HarnessError {
    if err.kind() == std::io::ErrorKind::NotFound {
        HarnessError::MissingDependency(format!("'{}' could not be executed: {}", program, err))
    } else {
        HarnessError::Exec(format!("Failed to spawn {}: {}", program, err))
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for unit tests

    use super::*;
    use std::sync::Mutex;

    type Responder = Box<dyn Fn(&CommandSpec) -> ProcessOutput + Send + Sync>;

    pub struct FakeRunner {
        calls: Mutex<Vec<CommandSpec>>,
        responder: Responder,
    }

    impl FakeRunner {
        /// Every command succeeds with empty output.
        pub fn ok() -> Self {
            Self::with(|_| ProcessOutput::default())
        }

        pub fn with(
            responder: impl Fn(&CommandSpec) -> ProcessOutput + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                responder: Box::new(responder),
            }
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().unwrap().clone()
        }

        /// Rendered command lines, program omitted.
        pub fn lines(&self) -> Vec<String> {
            self.calls().iter().map(|c| c.args.join(" ")).collect()
        }
    }

    pub fn stdout(text: &str) -> ProcessOutput {
        ProcessOutput {
            exit_code: 0,
            stdout: text.to_string(),
            stderr: String::new(),
        }
    }

    pub fn exit(code: i32) -> ProcessOutput {
        ProcessOutput {
            exit_code: code,
            ..Default::default()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, spec: &CommandSpec) -> HarnessResult<ProcessOutput> {
            self.calls.lock().unwrap().push(spec.clone());
            Ok((self.responder)(spec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_nonzero_exit_is_not_an_error() {
        let runner = SystemRunner::new(OutputMode::Quiet);
        let out = runner
            .run(&CommandSpec::new("sh").args(["-c", "exit 3"]))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_capture_stdout_and_env() {
        let runner = SystemRunner::new(OutputMode::Quiet);
        let out = runner
            .run(
                &CommandSpec::new("sh")
                    .args(["-c", "echo \"$GREETING\""])
                    .env("GREETING", "hello")
                    .capture(),
            )
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_stdin_payload_is_delivered() {
        let runner = SystemRunner::new(OutputMode::Quiet);
        let out = runner
            .run(&CommandSpec::new("cat").stdin("line one\nline two\n").capture())
            .await
            .unwrap();
        assert_eq!(out.stdout, "line one\nline two\n");
    }

    #[tokio::test]
    async fn test_uncaptured_output_is_not_returned() {
        let runner = SystemRunner::new(OutputMode::Quiet);
        let out = runner
            .run(&CommandSpec::new("sh").args(["-c", "echo discarded"]))
            .await
            .unwrap();
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_fatal() {
        let runner = SystemRunner::new(OutputMode::Quiet);
        let err = runner
            .run(&CommandSpec::new("definitely-not-a-real-binary-4711"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("docker").args(["ps", "-a"]);
        assert_eq!(spec.display(), "docker ps -a");
    }
}
