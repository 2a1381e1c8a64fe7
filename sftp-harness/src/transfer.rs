//! Batch-mode sftp sessions against a test container

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::container::ContainerHandle;
use crate::error::{HarnessError, HarnessResult};
use crate::process::{CommandRunner, CommandSpec};

pub struct FileTransferDriver {
    runner: Arc<dyn CommandRunner>,
    program: String,
    settle_delay: Duration,
}

impl FileTransferDriver {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            runner,
            program: program.into(),
            settle_delay,
        }
    }

    /// Feed `commands` to a non-interactive sftp session as `user`.
    ///
    /// Host keys are not verified: the target is always a container this
    /// run created. Returns the client's exit code.
    pub async fn run_batch(
        &self,
        container: &ContainerHandle,
        user: &str,
        private_key: &Path,
        commands: &[&str],
    ) -> HarnessResult<i32> {
        let ip = container.inspect_ip().await?;
        if ip.is_empty() {
            return Err(HarnessError::Exec(format!(
                "container {} has no address for sftp",
                container.name()
            )));
        }

        let mut script = commands.join("\n");
        script.push('\n');

        let spec = CommandSpec::new(&self.program)
            .arg("-i")
            .arg(private_key.display().to_string())
            .args([
                "-oStrictHostKeyChecking=no",
                "-oUserKnownHostsFile=/dev/null",
                "-b",
                "-",
            ])
            .arg(format!("{}@{}", user, ip))
            .stdin(script);

        tracing::info!("sftp batch as {}@{}: {:?}", user, ip, commands);
        let out = self.runner.run(&spec).await?;

        // The server may still be applying the last command
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        if !out.success() {
            tracing::warn!("sftp batch exited with {}", out.exit_code);
        }
        Ok(out.exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerEngine;
    use crate::process::testing::{exit, stdout, FakeRunner};
    use std::time::Instant;

    fn scripted(sftp_exit: i32) -> Arc<FakeRunner> {
        Arc::new(FakeRunner::with(move |spec| {
            if spec.program == "docker" {
                stdout("172.17.0.5\n")
            } else {
                exit(sftp_exit)
            }
        }))
    }

    #[tokio::test]
    async fn test_batch_invocation() {
        let runner = scripted(0);
        let handle = ContainerEngine::new(runner.clone(), "docker").handle("c1");
        let driver = FileTransferDriver::new(runner.clone(), "sftp", Duration::ZERO);

        let code = driver
            .run_batch(
                &handle,
                "test",
                Path::new("/keys/id_rsa"),
                &["cd share", "mkdir mkdir-test"],
            )
            .await
            .unwrap();
        assert_eq!(code, 0);

        let sftp = runner.calls().pop().unwrap();
        assert_eq!(sftp.program, "sftp");
        assert_eq!(
            sftp.args,
            vec![
                "-i",
                "/keys/id_rsa",
                "-oStrictHostKeyChecking=no",
                "-oUserKnownHostsFile=/dev/null",
                "-b",
                "-",
                "test@172.17.0.5"
            ]
        );
        assert_eq!(sftp.stdin.as_deref(), Some("cd share\nmkdir mkdir-test\n"));
    }

    #[tokio::test]
    async fn test_failure_exit_code_returned() {
        let runner = scripted(1);
        let handle = ContainerEngine::new(runner.clone(), "docker").handle("c1");
        let driver = FileTransferDriver::new(runner, "sftp", Duration::ZERO);
        let code = driver
            .run_batch(&handle, "test", Path::new("k"), &["mkdir /root/nope"])
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_settle_delay_applied() {
        let runner = scripted(0);
        let handle = ContainerEngine::new(runner.clone(), "docker").handle("c1");
        let driver = FileTransferDriver::new(runner, "sftp", Duration::from_millis(50));
        let started = Instant::now();
        driver.run_batch(&handle, "u", Path::new("k"), &["ls"]).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_no_address_is_an_error() {
        let runner = Arc::new(FakeRunner::with(|_| exit(1)));
        let handle = ContainerEngine::new(runner.clone(), "docker").handle("gone");
        let driver = FileTransferDriver::new(runner.clone(), "sftp", Duration::ZERO);
        let err = driver.run_batch(&handle, "u", Path::new("k"), &["ls"]).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(runner.calls().iter().all(|c| c.program != "sftp"));
    }
}
