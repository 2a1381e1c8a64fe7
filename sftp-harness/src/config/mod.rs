use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

fn default_image() -> String {
    "sftp_test".to_string()
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

fn default_engine() -> String {
    "docker".to_string()
}

fn default_sftp_client() -> String {
    "sftp".to_string()
}

fn default_keygen() -> String {
    "ssh-keygen".to_string()
}

fn default_settle_delay_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval_ms() -> u64 {
    1000
}

/// Whether the image is rebuilt before any case runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Rebuild without cache, pulling base images again
    Build,
    #[default]
    Skip,
}

impl BuildMode {
    /// `build` forces a rebuild; anything else skips it.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "build" { Self::Build } else { Self::Skip }
    }
}

/// Where subprocess output goes when it is not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Quiet,
    #[default]
    Verbose,
}

impl OutputMode {
    /// `quiet` discards output; anything else inherits the terminal.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "quiet" { Self::Quiet } else { Self::Verbose }
    }
}

/// Whether containers, the image and temp dirs are removed after use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupMode {
    Cleanup,
    #[default]
    Keep,
}

impl CleanupMode {
    pub fn from_arg(arg: &str) -> Self {
        if arg == "cleanup" { Self::Cleanup } else { Self::Keep }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadinessConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Run-wide settings, built once at startup and shared read-only by every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,
    #[serde(default)]
    pub build: BuildMode,
    #[serde(default)]
    pub output: OutputMode,
    #[serde(default)]
    pub cleanup: CleanupMode,
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_sftp_client")]
    pub sftp_client: String,
    #[serde(default = "default_keygen")]
    pub keygen: String,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Pause after every sftp batch before the result is acted on
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            build_context: default_build_context(),
            build: BuildMode::default(),
            output: OutputMode::default(),
            cleanup: CleanupMode::default(),
            engine: default_engine(),
            sftp_client: default_sftp_client(),
            keygen: default_keygen(),
            readiness: ReadinessConfig::default(),
            settle_delay_ms: default_settle_delay_ms(),
            log_level: default_log_level(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(raw: &str) -> HarnessResult<Self> {
        serde_json::from_str(raw).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn is_quiet(&self) -> bool {
        self.output == OutputMode::Quiet
    }

    pub fn cleanup_enabled(&self) -> bool {
        self.cleanup == CleanupMode::Cleanup
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Image name reduced to characters that are valid in a container name.
    pub fn image_slug(&self) -> String {
        self.image
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_modes() {
        assert_eq!(BuildMode::from_arg("build"), BuildMode::Build);
        assert_eq!(BuildMode::from_arg("no"), BuildMode::Skip);
        assert_eq!(OutputMode::from_arg("quiet"), OutputMode::Quiet);
        assert_eq!(OutputMode::from_arg("loud"), OutputMode::Verbose);
        assert_eq!(CleanupMode::from_arg("cleanup"), CleanupMode::Cleanup);
        assert_eq!(CleanupMode::from_arg(""), CleanupMode::Keep);
    }

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.engine, "docker");
        assert_eq!(config.readiness.port, 22);
        assert_eq!(config.readiness.max_attempts, 30);
        assert_eq!(config.settle_delay(), Duration::from_secs(1));
        assert!(!config.is_quiet());
        assert!(!config.cleanup_enabled());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = HarnessConfig::from_json_str(
            r#"{"image": "my/sftp:dev", "output": "quiet", "readiness": {"max_attempts": 5}}"#,
        )
        .unwrap();
        assert_eq!(config.image, "my/sftp:dev");
        assert!(config.is_quiet());
        assert_eq!(config.readiness.max_attempts, 5);
        assert_eq!(config.readiness.interval_ms, 1000);
        assert_eq!(config.sftp_client, "sftp");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = HarnessConfig::from_json_str(r#"{"imagee": "x"}"#).unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.json");
        std::fs::write(&path, r#"{"cleanup": "cleanup"}"#).unwrap();
        let config = HarnessConfig::load(&path).unwrap();
        assert!(config.cleanup_enabled());
    }

    #[test]
    fn test_image_slug() {
        let config = HarnessConfig {
            image: "registry.local/sftp:test".into(),
            ..Default::default()
        };
        assert_eq!(config.image_slug(), "registry.local_sftp_test");
    }
}
