//! Container engine CLI wrappers
//!
//! [`ContainerEngine`] covers image-level operations, [`ContainerHandle`]
//! everything addressed by a container name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::BuildMode;
use crate::error::{HarnessError, HarnessResult};
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};

const IP_FORMAT: &str =
    "{{if .State.Running}}{{range .NetworkSettings.Networks}}{{.IPAddress}} {{end}}{{end}}";

/// Bind mount from the host into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn bind(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.source.display(), self.target);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Options for a single `run` of the image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub image: String,
    pub env: Vec<(String, String)>,
    pub mounts: Vec<Mount>,
    pub args: Vec<String>,
    pub entrypoint: Option<String>,
    pub privileged: bool,
    pub detached: bool,
    pub remove_on_exit: bool,
}

impl RunOptions {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the image entrypoint, for one-shot command runs.
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn remove_on_exit(mut self) -> Self {
        self.remove_on_exit = true;
        self
    }

    fn to_args(&self, name: &str) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--name".to_string(), name.to_string()];
        if self.detached {
            args.push("--detach".into());
        }
        if self.remove_on_exit {
            args.push("--rm".into());
        }
        if self.privileged {
            args.push("--privileged".into());
        }
        for (k, v) in &self.env {
            args.push("--env".into());
            args.push(format!("{}={}", k, v));
        }
        for mount in &self.mounts {
            args.push("--volume".into());
            args.push(mount.volume_arg());
        }
        if let Some(entrypoint) = &self.entrypoint {
            args.push("--entrypoint".into());
            args.push(entrypoint.clone());
        }
        args.push(self.image.clone());
        args.extend(self.args.iter().cloned());
        args
    }
}

/// The container engine CLI (`docker` or a compatible binary).
#[derive(Clone)]
pub struct ContainerEngine {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl ContainerEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    fn command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
    }

    pub async fn run_command(&self, spec: CommandSpec) -> HarnessResult<ProcessOutput> {
        self.runner.run(&spec).await
    }

    /// Fails when the daemon cannot be reached, typically for lack of permission.
    pub async fn check_available(&self) -> HarnessResult<()> {
        let out = self.run_command(self.command().arg("info").capture()).await?;
        if !out.success() {
            return Err(HarnessError::EngineUnavailable(format!(
                "'{} info' exited with {}: {}",
                self.program,
                out.exit_code,
                out.stderr.trim()
            )));
        }
        Ok(())
    }

    pub async fn build_image(
        &self,
        image: &str,
        context: &Path,
        mode: BuildMode,
    ) -> HarnessResult<()> {
        if mode == BuildMode::Skip {
            tracing::info!("Skipping build of {}", image);
            return Ok(());
        }

        tracing::info!("Building {} from {:?} (no cache, fresh pull)...", image, context);
        let out = self
            .run_command(
                self.command()
                    .args(["build", "--pull", "--no-cache", "--tag", image])
                    .arg(context.display().to_string()),
            )
            .await?;
        if !out.success() {
            return Err(HarnessError::ImageBuild(format!(
                "{} (exit code: {})",
                image, out.exit_code
            )));
        }
        tracing::info!("Image {} built successfully", image);
        Ok(())
    }

    /// Remove an image. An image that is already gone is not an error.
    pub async fn remove_image(&self, image: &str) -> HarnessResult<()> {
        let out = self
            .run_command(self.command().args(["image", "rm", "--force", image]).capture())
            .await?;
        if out.success() {
            tracing::info!("Removed image {}", image);
        } else {
            tracing::debug!("Image {} not removed: {}", image, out.stderr.trim());
        }
        Ok(())
    }

    pub fn handle(&self, name: impl Into<String>) -> ContainerHandle {
        ContainerHandle {
            engine: self.clone(),
            name: name.into(),
        }
    }
}

/// A container addressed by name. The container may or may not exist.
#[derive(Clone)]
pub struct ContainerHandle {
    engine: ContainerEngine,
    name: String,
}

impl ContainerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a container under this handle's name.
    ///
    /// Detached runs are captured so `stdout` holds the container id;
    /// one-shot runs send their output to the configured sink.
    pub async fn run(&self, options: &RunOptions) -> HarnessResult<ProcessOutput> {
        let mut spec = self.engine.command().args(options.to_args(&self.name));
        if options.detached {
            spec = spec.capture();
        }
        let out = self.engine.run_command(spec).await?;
        if !out.success() {
            tracing::warn!(
                "Container {} run exited with {}: {}",
                self.name,
                out.exit_code,
                out.stderr.trim()
            );
        }
        Ok(out)
    }

    /// First IP address of the running container, or empty when not running.
    pub async fn inspect_ip(&self) -> HarnessResult<String> {
        let out = self
            .engine
            .run_command(
                self.engine
                    .command()
                    .args(["inspect", "--format", IP_FORMAT, self.name.as_str()])
                    .capture(),
            )
            .await?;
        if !out.success() {
            return Ok(String::new());
        }
        Ok(out
            .stdout
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Run a command inside the container; returns its exit code.
    pub async fn exec(&self, cmd: &[&str]) -> HarnessResult<i32> {
        let out = self
            .engine
            .run_command(
                self.engine
                    .command()
                    .arg("exec")
                    .arg(&self.name)
                    .args(cmd.iter().copied()),
            )
            .await?;
        Ok(out.exit_code)
    }

    /// Like [`exec`](Self::exec) but with stdout/stderr captured.
    pub async fn exec_output(&self, cmd: &[&str]) -> HarnessResult<ProcessOutput> {
        self.engine
            .run_command(
                self.engine
                    .command()
                    .arg("exec")
                    .arg(&self.name)
                    .args(cmd.iter().copied())
                    .capture(),
            )
            .await
    }

    /// Container output, stdout followed by stderr.
    pub async fn logs(&self) -> HarnessResult<String> {
        let out = self
            .engine
            .run_command(self.engine.command().args(["logs", self.name.as_str()]).capture())
            .await?;
        Ok(format!("{}{}", out.stdout, out.stderr))
    }

    /// Whether a container with exactly this name exists, running or stopped.
    pub async fn exists(&self) -> HarnessResult<bool> {
        let filter = format!("name=^/?{}$", regex::escape(&self.name));
        let out = self
            .engine
            .run_command(
                self.engine
                    .command()
                    .args(["ps", "--all", "--quiet", "--filter", filter.as_str()])
                    .capture(),
            )
            .await?;
        Ok(out.success() && !out.stdout.trim().is_empty())
    }

    /// Force-remove the container and its volumes if it exists.
    ///
    /// A missing container is a no-op. With `dump_logs` the container's
    /// output is logged before removal.
    pub async fn retire(&self, dump_logs: bool) -> HarnessResult<()> {
        if !self.exists().await? {
            tracing::debug!("No container named {} to retire", self.name);
            return Ok(());
        }

        if dump_logs {
            self.dump_logs().await?;
        }

        let out = self
            .engine
            .run_command(
                self.engine
                    .command()
                    .args(["rm", "--force", "--volumes", self.name.as_str()])
                    .capture(),
            )
            .await?;
        if out.success() {
            tracing::info!("Retired container {}", self.name);
        } else {
            tracing::warn!("Could not remove {}: {}", self.name, out.stderr.trim());
        }
        Ok(())
    }

    /// Leave the container in place for inspection, dumping its output first
    /// when asked. A missing container is a no-op.
    pub async fn leave(&self, dump_logs: bool) -> HarnessResult<()> {
        if !self.exists().await? {
            return Ok(());
        }
        if dump_logs {
            self.dump_logs().await?;
        }
        tracing::info!("Keeping container {}", self.name);
        Ok(())
    }

    async fn dump_logs(&self) -> HarnessResult<()> {
        let logs = self.logs().await?;
        tracing::info!("=== {} LOGS ===\n{}", self.name, logs.trim_end());
        Ok(())
    }
}
