use relay_core::config::AppConfig;
use relay_db::{connect, migrations};

use crate::commands::{self, exit_codes, CommandResult};

pub fn run() -> CommandResult {
    let config = match commands::load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    commands::block_on("migrate", apply(&config)).unwrap_or_else(|failure| failure)
}

async fn apply(config: &AppConfig) -> CommandResult {
    let pool = match connect(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "db_connectivity",
                error.to_string(),
                exit_codes::DB,
            );
        }
    };

    // Close the pool even when the migrator bails partway.
    let outcome = migrations::run_pending(&pool).await;
    pool.close().await;

    match outcome {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(error) => CommandResult::failure(
            "migrate",
            "migration",
            error.to_string(),
            exit_codes::MIGRATION,
        ),
    }
}
