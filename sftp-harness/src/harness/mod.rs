//! Run lifecycle
//!
//! ```text
//! one_time_set_up (engine check, image build)
//!   for each case: set_up -> body -> tear_down
//! one_time_tear_down (image and key removal)
//! ```
//!
//! `tear_down` runs once per case no matter how the body ended: normally,
//! with failed assertions, with an error or with a panic.

mod assert;
mod context;
mod report;

pub use assert::Assertions;
pub use context::TestContext;
pub use report::{CaseOutcome, RunReport};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::config::HarnessConfig;
use crate::container::ContainerEngine;
use crate::error::HarnessResult;
use crate::keys::KeyStore;
use crate::process::CommandRunner;
use crate::transfer::FileTransferDriver;
use crate::util::command::require_binaries;

pub type CaseBody = for<'a> fn(&'a mut TestContext) -> BoxFuture<'a, HarnessResult<()>>;

/// A named scenario run against a fresh container.
#[derive(Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub body: CaseBody,
}

impl TestCase {
    pub const fn new(name: &'static str, body: CaseBody) -> Self {
        Self { name, body }
    }
}

/// Shared, read-only state for the whole run.
pub(crate) struct RunEnv {
    pub config: HarnessConfig,
    pub engine: ContainerEngine,
    pub keys: KeyStore,
    pub transfer: FileTransferDriver,
    pub cancel: CancellationToken,
}

pub struct Harness {
    env: Arc<RunEnv>,
}

impl Harness {
    pub fn new(config: HarnessConfig, runner: Arc<dyn CommandRunner>) -> HarnessResult<Self> {
        let engine = ContainerEngine::new(runner.clone(), &config.engine);
        let keys = KeyStore::new(runner.clone(), &config.keygen)?;
        let transfer = FileTransferDriver::new(runner, &config.sftp_client, config.settle_delay());
        Ok(Self {
            env: Arc::new(RunEnv {
                config,
                engine,
                keys,
                transfer,
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.env.config
    }

    /// Cancelling this token aborts any readiness wait in progress.
    pub fn cancel_token(&self) -> CancellationToken {
        self.env.cancel.clone()
    }

    /// Container name for a case; stable across runs so leftovers can be found.
    pub fn container_name(&self, case: &str) -> String {
        format!("{}_{}", self.env.config.image_slug(), case)
    }

    /// Every external binary the run needs must be on `PATH`.
    pub fn check_dependencies(&self) -> HarnessResult<()> {
        let config = &self.env.config;
        require_binaries([
            config.engine.as_str(),
            config.sftp_client.as_str(),
            config.keygen.as_str(),
        ])
    }

    pub async fn one_time_set_up(&self) -> HarnessResult<()> {
        let config = &self.env.config;
        self.env.engine.check_available().await?;
        self.env
            .engine
            .build_image(&config.image, &config.build_context, config.build)
            .await
    }

    pub async fn one_time_tear_down(&self) -> HarnessResult<()> {
        let cleanup = self.env.config.cleanup_enabled();
        if cleanup {
            self.env.engine.remove_image(&self.env.config.image).await?;
        }
        self.env.keys.release(cleanup)
    }

    async fn set_up(&self, case: &'static str) -> HarnessResult<TestContext> {
        let container = self.env.engine.handle(self.container_name(case));
        // Left over from an aborted run
        container.retire(false).await?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("sftp-harness-{}-", case))
            .tempdir()?;
        Ok(TestContext::new(self.env.clone(), case, container, workspace))
    }

    async fn tear_down(&self, mut ctx: TestContext) -> HarnessResult<()> {
        let verbose = !self.env.config.is_quiet();
        let cleanup = self.env.config.cleanup_enabled();
        // A kept container is retired by the next run's set-up
        let retired = if cleanup {
            ctx.container().retire(verbose).await
        } else {
            ctx.container().leave(verbose).await
        };

        if let Some(workspace) = ctx.workspace.take() {
            if cleanup {
                workspace.close()?;
            } else {
                let kept = workspace.keep();
                tracing::info!("Keeping workspace of {} in {:?}", ctx.case_name(), kept);
            }
        }
        retired
    }

    /// Run one case through set-up, body and tear-down.
    ///
    /// Only fatal errors are returned; everything else ends up in the outcome.
    pub async fn run_case(&self, case: &TestCase) -> HarnessResult<CaseOutcome> {
        tracing::info!("=== {} ===", case.name);
        let started = Instant::now();

        let mut ctx = match self.set_up(case.name).await {
            Ok(ctx) => ctx,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Ok(CaseOutcome {
                    name: case.name.to_string(),
                    passed_assertions: 0,
                    failures: vec![format!("set-up failed: {}", e)],
                    duration: started.elapsed(),
                });
            }
        };

        let mut fatal = None;
        let result = AssertUnwindSafe((case.body)(&mut ctx)).catch_unwind().await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_fatal() => fatal = Some(e),
            Ok(Err(e)) => ctx.assertions.fail(&format!("unexpected error: {}", e)),
            Err(panic) => ctx.assertions.fail(&format!("panicked: {}", panic_message(&*panic))),
        }

        let assertions = std::mem::take(&mut ctx.assertions);
        let torn_down = self.tear_down(ctx).await;

        if let Some(e) = fatal {
            return Err(e);
        }

        let (passed_assertions, mut failures) = assertions.into_parts();
        match torn_down {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => failures.push(format!("tear-down failed: {}", e)),
        }

        let outcome = CaseOutcome {
            name: case.name.to_string(),
            passed_assertions,
            failures,
            duration: started.elapsed(),
        };
        if outcome.passed() {
            tracing::info!("{} passed in {:.1?}", outcome.name, outcome.duration);
        } else {
            tracing::error!("{} failed in {:.1?}", outcome.name, outcome.duration);
        }
        Ok(outcome)
    }

    /// Full run. A fatal error stops it after a best-effort one-time tear-down.
    pub async fn run(&self, cases: &[TestCase]) -> HarnessResult<RunReport> {
        if let Err(e) = self.one_time_set_up().await {
            self.abort_tear_down().await;
            return Err(e);
        }

        let mut report = RunReport::default();
        for case in cases {
            match self.run_case(case).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    self.abort_tear_down().await;
                    return Err(e);
                }
            }
        }

        self.one_time_tear_down().await?;
        Ok(report)
    }

    async fn abort_tear_down(&self) {
        if let Err(e) = self.one_time_tear_down().await {
            tracing::warn!("One-time tear-down after abort failed: {}", e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
