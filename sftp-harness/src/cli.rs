use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use crate::cases;
use crate::config::{BuildMode, CleanupMode, HarnessConfig, OutputMode};
use crate::error::HarnessError;
use crate::harness::Harness;
use crate::process::SystemRunner;
use crate::util::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "sftp-harness")]
#[command(
    version,
    about = "Builds the SFTP server image and runs its integration tests",
    long_about = None
)]
struct Cli {
    /// `build` rebuilds the image (no cache, fresh pull); anything else skips the build
    build: Option<String>,

    /// `quiet` discards subprocess output; anything else shows it
    output: Option<String>,

    /// `cleanup` removes containers, the image and temp dirs afterwards; anything else keeps them
    cleanup: Option<String>,

    /// JSON config file; positional arguments and flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Image name to build and test
    #[arg(long)]
    image: Option<String>,

    /// Build context directory
    #[arg(long)]
    context: Option<PathBuf>,

    /// Container engine binary
    #[arg(long)]
    engine: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Only run the named case (repeatable)
    #[arg(long = "only", value_name = "CASE")]
    only: Vec<String>,

    /// Print case names and exit
    #[arg(long)]
    list: bool,
}

fn build_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config file {:?}", path))?,
        None => HarnessConfig::default(),
    };

    if let Some(build) = &cli.build {
        config.build = BuildMode::from_arg(build);
    }
    if let Some(output) = &cli.output {
        config.output = OutputMode::from_arg(output);
    }
    if let Some(cleanup) = &cli.cleanup {
        config.cleanup = CleanupMode::from_arg(cleanup);
    }
    if let Some(image) = &cli.image {
        config.image = image.clone();
    }
    if let Some(context) = &cli.context {
        config.build_context = context.clone();
    }
    if let Some(engine) = &cli.engine {
        config.engine = engine.clone();
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config = build_config(&cli)?;
    init_logging(&config.log_level);

    let selected = cases::select(&cli.only)?;
    if cli.list {
        for case in &selected {
            println!("{}", case.name);
        }
        return Ok(0);
    }

    tracing::debug!("Config: {:?}", config);
    let runner = Arc::new(SystemRunner::new(config.output));
    let harness = Harness::new(config, runner)?;
    harness.check_dependencies()?;

    let cancel = harness.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("Interrupted, abandoning readiness waits (press Ctrl+C again to exit)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });

    let report = harness.run(&selected).await?;
    println!("{}", report);
    Ok(report.exit_code())
}

pub async fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let code = e.downcast_ref::<HarnessError>().map_or(1, HarnessError::exit_code);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_run_parameters() {
        let cli = Cli::try_parse_from(["sftp-harness", "build", "quiet", "cleanup"]).unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.build, BuildMode::Build);
        assert_eq!(config.output, OutputMode::Quiet);
        assert_eq!(config.cleanup, CleanupMode::Cleanup);
    }

    #[test]
    fn test_other_values_mean_skip_verbose_keep() {
        let cli = Cli::try_parse_from(["sftp-harness", "no", "loud", "keep"]).unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.build, BuildMode::Skip);
        assert_eq!(config.output, OutputMode::Verbose);
        assert_eq!(config.cleanup, CleanupMode::Keep);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{"image": "from-file", "engine": "podman"}"#).unwrap();

        let cli = Cli::try_parse_from([
            "sftp-harness",
            "--config",
            path.to_str().unwrap(),
            "--image",
            "from-flag",
            "--only",
            "custom_uid_and_gid",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.image, "from-flag");
        assert_eq!(config.engine, "podman");
        assert_eq!(cli.only, vec!["custom_uid_and_gid"]);
    }

    #[test]
    fn test_missing_config_file_has_context() {
        let cli =
            Cli::try_parse_from(["sftp-harness", "--config", "/nonexistent/harness.json"]).unwrap();
        let err = build_config(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to load config file"));
    }

    #[test]
    fn test_fatal_error_exit_code_survives_anyhow() {
        let err: anyhow::Error = HarnessError::ImageBuild("sftp_test".into()).into();
        assert_eq!(err.downcast_ref::<HarnessError>().map_or(1, HarnessError::exit_code), 3);
    }
}
