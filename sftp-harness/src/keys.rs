//! Client key pair shared by every transfer test

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::sync::OnceCell;

use crate::error::{HarnessError, HarnessResult};
use crate::process::{CommandRunner, CommandSpec};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

/// Generates the RSA key pair on first use and keeps it for the rest of the run.
pub struct KeyStore {
    runner: Arc<dyn CommandRunner>,
    keygen: String,
    dir_path: PathBuf,
    dir: Mutex<Option<TempDir>>,
    pair: OnceCell<KeyPair>,
}

impl KeyStore {
    pub fn new(runner: Arc<dyn CommandRunner>, keygen: impl Into<String>) -> HarnessResult<Self> {
        let dir = tempfile::Builder::new().prefix("sftp-harness-keys-").tempdir()?;
        Ok(Self {
            runner,
            keygen: keygen.into(),
            dir_path: dir.path().to_path_buf(),
            dir: Mutex::new(Some(dir)),
            pair: OnceCell::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir_path
    }

    pub fn is_generated(&self) -> bool {
        self.pair.initialized()
    }

    pub async fn get(&self) -> HarnessResult<&KeyPair> {
        self.pair.get_or_try_init(|| self.generate()).await
    }

    async fn generate(&self) -> HarnessResult<KeyPair> {
        let private_key = self.dir_path.join("id_rsa");
        let public_key = self.dir_path.join("id_rsa.pub");
        tracing::info!("Generating client key pair at {:?}", private_key);

        let out = self
            .runner
            .run(
                &CommandSpec::new(&self.keygen)
                    .args(["-t", "rsa", "-b", "4096", "-N", "", "-q", "-f"])
                    .arg(private_key.display().to_string())
                    .capture(),
            )
            .await?;
        if !out.success() {
            return Err(HarnessError::Exec(format!(
                "{} exited with {}: {}",
                self.keygen,
                out.exit_code,
                out.stderr.trim()
            )));
        }

        // ssh refuses private keys readable by others
        set_mode(&private_key, 0o600).await?;
        set_mode(&public_key, 0o644).await?;

        Ok(KeyPair {
            private_key,
            public_key,
        })
    }

    /// Delete the key directory, or leave it on disk when `cleanup` is false.
    pub fn release(&self, cleanup: bool) -> HarnessResult<()> {
        let dir = match self.dir.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(dir) = dir else {
            return Ok(());
        };

        if cleanup {
            dir.close()?;
        } else {
            let kept = dir.keep();
            tracing::info!("Keeping key pair in {:?}", kept);
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> HarnessResult<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> HarnessResult<()> {
    Ok(())
}
