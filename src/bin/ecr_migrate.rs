//! Migration CLI: `ecr-migrate up` / `ecr-migrate down [target]`.
//!
//! Dialect, schema, and connection parameters come from the environment.
//! Prints the step names it applied or reverted and exits non-zero on
//! failure.

use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use ecr_persistence::db::Database;
use ecr_persistence::error::StoreResult;
use ecr_persistence::migrate::MigrationRunner;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "migration run failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &[String]) -> StoreResult<()> {
    let db = Database::from_env()?;
    let runner = MigrationRunner::new(&db);

    match args.first().map(String::as_str) {
        Some("up") => {
            let applied = runner.up().await?;
            if applied.is_empty() {
                println!("no pending migrations");
            }
            for name in applied {
                println!("applied {name}");
            }
            Ok(())
        }
        Some("down") => {
            let target = args.get(1).map(String::as_str);
            let reverted = runner.down(target).await?;
            if reverted.is_empty() {
                println!("nothing to revert");
            }
            for name in reverted {
                println!("reverted {name}");
            }
            Ok(())
        }
        other => {
            eprintln!("usage: ecr-migrate <up | down [target]>");
            Err(ecr_persistence::error::ConfigurationError::InvalidValue {
                field: "command",
                value: other.unwrap_or("").to_string(),
            }
            .into())
        }
    }
}
