use anyhow::Result;
use clap::Parser;
use role_tester_core::errors::{ConfigError, RoleTesterError};
use role_tester_core::pipeline::ExitCode;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    // Dispatch to CLI handler and map the outcome to the documented exit codes
    match parsed.dispatch().await {
        Ok(ExitCode::Ok) => Ok(()),
        Ok(code) => std::process::exit(code.code()),
        Err(err) => {
            // A source that is not an Ansible role has its own exit code
            if let Some(tester_error) = err.downcast_ref::<RoleTesterError>() {
                if matches!(
                    tester_error,
                    RoleTesterError::Config(ConfigError::NotARole { .. })
                ) {
                    eprintln!("Error: {}", tester_error);
                    std::process::exit(ExitCode::NotARole.code());
                }
            }

            // For all other errors, return them normally
            Err(err)
        }
    }
}
