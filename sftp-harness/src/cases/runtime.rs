//! Container start-up behaviour

use std::time::Duration;

use futures::future::BoxFuture;

use super::start_and_wait;
use crate::container::Mount;
use crate::error::HarnessResult;
use crate::harness::{TestCase, TestContext};
use crate::readiness::WaitConfig;
use crate::users::UserSpec;

const BIND_MOUNT_SCRIPT: &str = r#"#!/bin/bash
mkdir -p /home/custom/source /home/custom/bindmount
mount --bind /home/custom/source /home/custom/bindmount
"#;

pub(super) fn cases() -> Vec<TestCase> {
    vec![
        TestCase::new("command_passthrough", command_passthrough),
        TestCase::new("readiness_timeout", readiness_timeout),
        TestCase::new("bind_mount_script", bind_mount_script),
    ]
}

/// Arguments that are not user specs run as a command.
fn command_passthrough(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let options = ctx.image().args(["test", "1", "-eq", "1"]);
        let code = ctx.run_once(options).await?;
        ctx.assert_equals(&0, &code, "command was not passed through");
        Ok(())
    })
}

/// Nothing listens on the ssh port, so the readiness wait must give up.
fn readiness_timeout(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let options = ctx.image().entrypoint("sleep").arg("60");
        if !ctx.start(options).await? {
            return Ok(());
        }

        let wait = WaitConfig::with_description("port that never opens")
            .max_attempts(3)
            .interval(Duration::from_millis(500));
        let ready = ctx.wait_for_ready_with(wait).await?;
        ctx.assert_false(ready, "readiness reported an open port with no sshd running");
        Ok(())
    })
}

/// Scripts in /etc/sftp.d run before sshd starts.
fn bind_mount_script(ctx: &mut TestContext) -> BoxFuture<'_, HarnessResult<()>> {
    Box::pin(async move {
        let script = ctx.write_executable("bindmount.sh", BIND_MOUNT_SCRIPT)?;
        let options = ctx
            .image()
            .privileged()
            .mount(Mount::bind(script, "/etc/sftp.d/bindmount.sh").read_only())
            .arg(UserSpec::new("custom").to_string());
        if !start_and_wait(ctx, options).await? {
            return Ok(());
        }
        ctx.assert_dir_exists("/home/custom/bindmount").await?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CleanupMode, HarnessConfig, OutputMode};
    use crate::harness::Harness;
    use crate::process::testing::{exit, stdout, FakeRunner};
    use crate::process::ProcessOutput;
    use std::sync::Arc;

    fn quiet() -> HarnessConfig {
        HarnessConfig {
            output: OutputMode::Quiet,
            cleanup: CleanupMode::Cleanup,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_command_passthrough_uses_exit_code() {
        let runner = Arc::new(FakeRunner::with(|spec| match spec.args[0].as_str() {
            "run" => exit(1),
            _ => ProcessOutput::default(),
        }));
        let harness = Harness::new(quiet(), runner.clone()).unwrap();
        let case = TestCase::new("command_passthrough", command_passthrough);

        let outcome = harness.run_case(&case).await.unwrap();
        assert_eq!(outcome.failures.len(), 1);
        let run = runner.lines().into_iter().find(|l| l.starts_with("run ")).unwrap();
        assert!(run.ends_with("sftp_test test 1 -eq 1"));
        assert!(!run.contains("--detach"));
    }

    #[tokio::test]
    async fn test_readiness_timeout_passes_when_port_stays_closed() {
        // An address nothing answers on; connect fails fast
        let runner = Arc::new(FakeRunner::with(|spec| match spec.args[0].as_str() {
            "inspect" => stdout("127.0.0.1\n"),
            _ => ProcessOutput::default(),
        }));
        let mut config = quiet();
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        config.readiness.port = listener.local_addr().unwrap().port();
        drop(listener);
        let harness = Harness::new(config, runner).unwrap();
        let case = TestCase::new("readiness_timeout", readiness_timeout);

        let outcome = harness.run_case(&case).await.unwrap();
        assert!(outcome.passed(), "{:?}", outcome.failures);
    }
}
