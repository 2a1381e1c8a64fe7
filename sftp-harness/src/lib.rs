//! Integration test harness for a containerised SFTP server image.
//!
//! Builds the image once, then runs every case in [`cases`] against a fresh
//! container: start it, wait for sshd, drive it with `exec` and batch
//! `sftp`, record assertions, and retire it again.

pub mod cases;
pub mod cli;
pub mod config;
pub mod container;
pub mod error;
pub mod harness;
pub mod keys;
pub mod process;
pub mod readiness;
pub mod transfer;
pub mod users;
pub mod util;

pub use cli::run_cli;
pub use error::{HarnessError, HarnessResult};
