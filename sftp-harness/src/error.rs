//! Error type for the harness

/// Errors raised while provisioning or driving containers.
///
/// Only the fatal variants (see [`HarnessError::is_fatal`]) unwind past a
/// test case; everything else is recorded against the case that hit it.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Image build failed: {0}")]
    ImageBuild(String),

    #[error("Exec failed: {0}")]
    Exec(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Cancelled while waiting for: {0}")]
    Cancelled(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    /// Setup errors that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::MissingDependency(_)
                | HarnessError::EngineUnavailable(_)
                | HarnessError::ImageBuild(_)
        )
    }

    /// Process exit code for this error when it ends the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            HarnessError::MissingDependency(_) | HarnessError::EngineUnavailable(_) => 2,
            HarnessError::ImageBuild(_) => 3,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_are_fatal() {
        assert!(HarnessError::MissingDependency("sftp".into()).is_fatal());
        assert!(HarnessError::EngineUnavailable("permission denied".into()).is_fatal());
        assert!(HarnessError::ImageBuild("exit 1".into()).is_fatal());
    }

    #[test]
    fn test_case_level_errors_are_not_fatal() {
        assert!(!HarnessError::Exec("boom".into()).is_fatal());
        assert!(!HarnessError::Timeout("port 22".into()).is_fatal());
        assert!(!HarnessError::Parse("bad".into()).is_fatal());
    }

    #[test]
    fn test_fatal_exit_codes_are_distinct() {
        assert_eq!(HarnessError::MissingDependency("x".into()).exit_code(), 2);
        assert_eq!(HarnessError::ImageBuild("x".into()).exit_code(), 3);
        assert_eq!(HarnessError::Exec("x".into()).exit_code(), 1);
    }
}
