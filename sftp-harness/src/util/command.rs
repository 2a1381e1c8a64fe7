use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::{HarnessError, HarnessResult};

pub fn binary_exists(name: &str) -> bool {
    if name.contains('/') {
        return fs::metadata(name).is_ok();
    }

    if let Ok(path) = env::var("PATH") {
        for dir in path.split(':') {
            let mut p = PathBuf::from(dir);
            p.push(name);
            if fs::metadata(&p).is_ok() {
                return true;
            }
        }
    }
    false
}

/// Fail with the first binary that is not installed.
pub fn require_binaries<'a>(names: impl IntoIterator<Item = &'a str>) -> HarnessResult<()> {
    for name in names {
        if !binary_exists(name) {
            return Err(HarnessError::MissingDependency(format!(
                "'{}' not found on PATH",
                name
            )));
        }
    }
    Ok(())
}
