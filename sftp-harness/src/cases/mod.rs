//! Scenario catalogue run against the image
//!
//! Each case gets a fresh, uniquely named container and workspace from the
//! harness and leaves clean-up to it.

mod files;
mod runtime;
mod users;

use crate::container::RunOptions;
use crate::error::{HarnessError, HarnessResult};
use crate::harness::{TestCase, TestContext};

/// Path the image reads user specs from.
pub const USERS_CONF: &str = "/etc/sftp/users.conf";
/// Older path still honoured by the image.
pub const LEGACY_USERS_CONF: &str = "/etc/sftp-users.conf";

pub fn all() -> Vec<TestCase> {
    let mut cases = users::cases();
    cases.extend(runtime::cases());
    cases.extend(files::cases());
    cases
}

/// Cases named in `only`, in catalogue order. Empty selects everything.
pub fn select(only: &[String]) -> HarnessResult<Vec<TestCase>> {
    let cases = all();
    if let Some(unknown) = only
        .iter()
        .find(|name| !cases.iter().any(|c| c.name == name.as_str()))
    {
        return Err(HarnessError::Config(format!("unknown test case '{}'", unknown)));
    }
    Ok(cases
        .into_iter()
        .filter(|c| only.is_empty() || only.iter().any(|name| name == c.name))
        .collect())
}

/// Start the case container and wait for sshd. `false` means a failure
/// was already recorded and the case should stop.
async fn start_and_wait(ctx: &mut TestContext, options: RunOptions) -> HarnessResult<bool> {
    Ok(ctx.start(options).await? && ctx.assert_ready().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_case_names_unique() {
        let cases = all();
        let names: HashSet<_> = cases.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), cases.len());
        assert!(cases.len() >= 12);
    }

    #[test]
    fn test_select_keeps_catalogue_order() {
        let picked =
            select(&["command_passthrough".into(), "create_users_using_env".into()]).unwrap();
        let names: Vec<_> = picked.iter().map(|c| c.name).collect();
        assert_eq!(names, ["create_users_using_env", "command_passthrough"]);
    }

    #[test]
    fn test_select_empty_is_everything() {
        assert_eq!(select(&[]).unwrap().len(), all().len());
    }

    #[test]
    fn test_select_unknown_fails() {
        let err = select(&["nope".into()]).err().unwrap();
        assert!(matches!(err, HarnessError::Config(msg) if msg.contains("nope")));
    }
}
