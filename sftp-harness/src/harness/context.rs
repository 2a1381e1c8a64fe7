//! Per-case state handed to every test body

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use super::assert::Assertions;
use super::RunEnv;
use crate::config::HarnessConfig;
use crate::container::{ContainerHandle, RunOptions};
use crate::error::HarnessResult;
use crate::keys::KeyPair;
use crate::process::ProcessOutput;
use crate::readiness::{wait_for_open_port, WaitConfig};

pub struct TestContext {
    env: Arc<RunEnv>,
    case: &'static str,
    container: ContainerHandle,
    workspace_path: PathBuf,
    pub(super) workspace: Option<TempDir>,
    pub(super) assertions: Assertions,
}

impl TestContext {
    pub(super) fn new(
        env: Arc<RunEnv>,
        case: &'static str,
        container: ContainerHandle,
        workspace: TempDir,
    ) -> Self {
        Self {
            env,
            case,
            container,
            workspace_path: workspace.path().to_path_buf(),
            workspace: Some(workspace),
            assertions: Assertions::default(),
        }
    }

    pub fn case_name(&self) -> &'static str {
        self.case
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.env.config
    }

    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Scratch directory for fixtures, removed at tear-down when cleanup is on.
    pub fn workspace(&self) -> &Path {
        &self.workspace_path
    }

    /// Run options preset with the image under test.
    pub fn image(&self) -> RunOptions {
        RunOptions::new(&self.env.config.image)
    }

    /// Start the case container in the background and assert that it started.
    pub async fn start(&mut self, options: RunOptions) -> HarnessResult<bool> {
        let out = self.container.run(&options.detached()).await?;
        Ok(self.assertions.assert_equals(&0, &out.exit_code, "container start"))
    }

    /// Run the image to completion and return its exit code.
    pub async fn run_once(&mut self, options: RunOptions) -> HarnessResult<i32> {
        let out = self.container.run(&options).await?;
        Ok(out.exit_code)
    }

    /// Wait for the configured port using the configured budget.
    pub async fn wait_for_ready(&self) -> HarnessResult<bool> {
        let config =
            WaitConfig::from(&self.env.config.readiness).cancel_on(self.env.cancel.child_token());
        self.wait_for_ready_with(config).await
    }

    pub async fn wait_for_ready_with(&self, config: WaitConfig) -> HarnessResult<bool> {
        wait_for_open_port(&self.container, self.env.config.readiness.port, config).await
    }

    /// Wait for readiness and record the result as an assertion.
    pub async fn assert_ready(&mut self) -> HarnessResult<bool> {
        let ready = self.wait_for_ready().await?;
        Ok(self.assertions.assert_true(ready, "container never opened its ssh port"))
    }

    pub async fn exec(&self, cmd: &[&str]) -> HarnessResult<i32> {
        self.container.exec(cmd).await
    }

    pub async fn exec_output(&self, cmd: &[&str]) -> HarnessResult<ProcessOutput> {
        self.container.exec_output(cmd).await
    }

    pub async fn user_exists(&self, user: &str) -> HarnessResult<bool> {
        Ok(self.exec(&["id", user]).await? == 0)
    }

    pub async fn dir_exists(&self, path: &str) -> HarnessResult<bool> {
        Ok(self.exec(&["test", "-d", path]).await? == 0)
    }

    pub async fn assert_user_exists(&mut self, user: &str) -> HarnessResult<bool> {
        let exists = self.user_exists(user).await?;
        Ok(self.assertions.assert_true(exists, &format!("user {} does not exist", user)))
    }

    pub async fn assert_dir_exists(&mut self, path: &str) -> HarnessResult<bool> {
        let exists = self.dir_exists(path).await?;
        Ok(self.assertions.assert_true(exists, &format!("directory {} does not exist", path)))
    }

    pub async fn key_pair(&self) -> HarnessResult<KeyPair> {
        self.env.keys.get().await.cloned()
    }

    /// Run an sftp batch as `user` with the shared key pair.
    pub async fn sftp(&self, user: &str, commands: &[&str]) -> HarnessResult<i32> {
        let keys = self.key_pair().await?;
        self.env
            .transfer
            .run_batch(&self.container, user, &keys.private_key, commands)
            .await
    }

    pub fn write_file(&self, relative: &str, contents: &str) -> HarnessResult<PathBuf> {
        let path = self.workspace_path.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    pub fn write_executable(&self, relative: &str, contents: &str) -> HarnessResult<PathBuf> {
        let path = self.write_file(relative, contents)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(path)
    }

    pub fn create_dir(&self, relative: &str) -> HarnessResult<PathBuf> {
        let path = self.workspace_path.join(relative);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    pub fn assert_true(&mut self, condition: bool, message: &str) -> bool {
        self.assertions.assert_true(condition, message)
    }

    pub fn assert_false(&mut self, condition: bool, message: &str) -> bool {
        self.assertions.assert_false(condition, message)
    }

    pub fn assert_equals<T: PartialEq + std::fmt::Debug + ?Sized>(
        &mut self,
        expected: &T,
        actual: &T,
        message: &str,
    ) -> bool {
        self.assertions.assert_equals(expected, actual, message)
    }

    pub fn assert_contains(&mut self, haystack: &str, needle: &str, message: &str) -> bool {
        self.assertions.assert_contains(haystack, needle, message)
    }
}
