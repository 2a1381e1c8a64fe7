use std::process::ExitCode;

use sftp_harness::run_cli;

#[tokio::main]
async fn main() -> ExitCode {
    run_cli().await
}
