use std::sync::Arc;

use clap::Subcommand;

use relay_core::domain::tenant::CustomerId;
use relay_db::{
    connect, SqlTenantRepository, SqlUserRepository, UserRepository,
};
use relay_server::directory::{DirectoryError, TenantDirectory};

use crate::commands::tenant::directory_failure;
use crate::commands::{self, exit_codes, CommandResult};

#[derive(Debug, Subcommand)]
pub enum UserAction {
    #[command(about = "Manually bind a user to a tenant")]
    Assign {
        uid: String,
        customer_id: String,
        #[arg(long, help = "Email to record on the user's durable record")]
        email: Option<String>,
    },
    #[command(about = "Show a user's durable record")]
    Show { uid: String },
}

pub fn run(action: UserAction) -> CommandResult {
    let config = match commands::load_config("user") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let task = async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    "user",
                    "db_connectivity",
                    error.to_string(),
                    exit_codes::DB,
                );
            }
        };

        let users = Arc::new(SqlUserRepository::new(pool.clone()));
        let directory = TenantDirectory::new(
            Arc::new(SqlTenantRepository::new(pool.clone())),
            users.clone(),
            config.access.global_access,
        );

        let result = apply(&directory, users.as_ref(), action).await;
        pool.close().await;
        result.unwrap_or_else(|error| directory_failure("user", error))
    };
    commands::block_on("user", task).unwrap_or_else(|failure| failure)
}

async fn apply(
    directory: &TenantDirectory,
    users: &SqlUserRepository,
    action: UserAction,
) -> Result<CommandResult, DirectoryError> {
    match action {
        UserAction::Assign { uid, customer_id, email } => {
            directory
                .assign_user(&uid, email.as_deref(), &CustomerId(customer_id.clone()))
                .await?;
            Ok(CommandResult::success(
                "user",
                format!("assigned `{uid}` to tenant `{customer_id}`"),
            ))
        }
        UserAction::Show { uid } => match users.get(&uid).await? {
            Some(record) => Ok(CommandResult::success_with_data(
                "user",
                format!("user `{uid}`"),
                serde_json::to_value(&record).unwrap_or_default(),
            )),
            None => Ok(CommandResult::failure(
                "user",
                "not_found",
                format!("no record for user `{uid}`"),
                exit_codes::DIRECTORY,
            )),
        },
    }
}
