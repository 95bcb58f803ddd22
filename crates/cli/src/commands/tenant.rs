use std::sync::Arc;

use clap::Subcommand;

use relay_core::domain::tenant::CustomerId;
use relay_db::{connect, SqlTenantRepository, SqlUserRepository};
use relay_server::directory::{DirectoryError, TenantDirectory};

use crate::commands::{self, exit_codes, CommandResult};

#[derive(Debug, Subcommand)]
pub enum TenantAction {
    #[command(about = "Register a new tenant")]
    Add {
        id: String,
        name: String,
        #[arg(long, help = "Backend endpoint the gateway routes this tenant to")]
        endpoint: Option<String>,
    },
    #[command(about = "List all tenants")]
    List,
    #[command(about = "Show one tenant with its access rules")]
    Show { id: String },
    #[command(about = "Re-enable a deactivated tenant")]
    Enable { id: String },
    #[command(about = "Deactivate a tenant without deleting its records")]
    Disable { id: String },
    #[command(about = "Set or clear the tenant's backend endpoint")]
    SetEndpoint {
        id: String,
        #[arg(help = "New endpoint URL; omit to clear")]
        endpoint: Option<String>,
    },
    #[command(about = "Set or clear the tenant's per-minute rate limit override")]
    SetRateLimit {
        id: String,
        #[arg(help = "Requests per minute; omit to fall back to the default")]
        per_minute: Option<u32>,
    },
    #[command(about = "Allow all users of an email domain")]
    AddDomain { id: String, domain: String },
    #[command(about = "Remove an allowed domain (existing assignments stay)")]
    RemoveDomain { id: String, domain: String },
    #[command(about = "Allow one email address")]
    AddEmail { id: String, email: String },
    #[command(about = "Remove an allowed email (existing assignments stay)")]
    RemoveEmail { id: String, email: String },
}

pub fn run(action: TenantAction) -> CommandResult {
    let config = match commands::load_config("tenant") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let task = async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    "tenant",
                    "db_connectivity",
                    error.to_string(),
                    exit_codes::DB,
                );
            }
        };

        let directory = TenantDirectory::new(
            Arc::new(SqlTenantRepository::new(pool.clone())),
            Arc::new(SqlUserRepository::new(pool.clone())),
            config.access.global_access,
        );

        let result = apply(&directory, action).await;
        pool.close().await;
        result.unwrap_or_else(|error| directory_failure("tenant", error))
    };
    commands::block_on("tenant", task).unwrap_or_else(|failure| failure)
}

async fn apply(
    directory: &TenantDirectory,
    action: TenantAction,
) -> Result<CommandResult, DirectoryError> {
    match action {
        TenantAction::Add { id, name, endpoint } => {
            let tenant = directory.create_tenant(&id, &name, endpoint).await?;
            Ok(CommandResult::success_with_data(
                "tenant",
                format!("created tenant `{id}`"),
                serde_json::to_value(&tenant).unwrap_or_default(),
            ))
        }
        TenantAction::List => {
            let tenants = directory.list_tenants().await?;
            let count = tenants.len();
            Ok(CommandResult::success_with_data(
                "tenant",
                format!("{count} tenant(s)"),
                serde_json::to_value(&tenants).unwrap_or_default(),
            ))
        }
        TenantAction::Show { id } => {
            let customer_id = CustomerId(id.clone());
            match directory.get_tenant(&customer_id).await? {
                Some(tenant) => Ok(CommandResult::success_with_data(
                    "tenant",
                    format!("tenant `{id}`"),
                    serde_json::to_value(&tenant).unwrap_or_default(),
                )),
                None => Err(DirectoryError::TenantNotFound(id)),
            }
        }
        TenantAction::Enable { id } => {
            directory.set_enabled(&CustomerId(id.clone()), true).await?;
            Ok(CommandResult::success("tenant", format!("enabled tenant `{id}`")))
        }
        TenantAction::Disable { id } => {
            directory.set_enabled(&CustomerId(id.clone()), false).await?;
            Ok(CommandResult::success("tenant", format!("disabled tenant `{id}`")))
        }
        TenantAction::SetEndpoint { id, endpoint } => {
            let message = match &endpoint {
                Some(url) => format!("endpoint for `{id}` set to {url}"),
                None => format!("endpoint for `{id}` cleared"),
            };
            directory.set_endpoint(&CustomerId(id), endpoint).await?;
            Ok(CommandResult::success("tenant", message))
        }
        TenantAction::SetRateLimit { id, per_minute } => {
            let message = match per_minute {
                Some(limit) => format!("rate limit for `{id}` set to {limit}/min"),
                None => format!("rate limit override for `{id}` cleared"),
            };
            directory.set_rate_limit(&CustomerId(id), per_minute).await?;
            Ok(CommandResult::success("tenant", message))
        }
        TenantAction::AddDomain { id, domain } => {
            let normalized = directory.add_domain(&CustomerId(id.clone()), &domain).await?;
            Ok(CommandResult::success(
                "tenant",
                format!("domain `{normalized}` allowed for `{id}`"),
            ))
        }
        TenantAction::RemoveDomain { id, domain } => {
            directory.remove_domain(&CustomerId(id.clone()), &domain).await?;
            Ok(CommandResult::success("tenant", format!("domain removed from `{id}`")))
        }
        TenantAction::AddEmail { id, email } => {
            let normalized = directory.add_email(&CustomerId(id.clone()), &email).await?;
            Ok(CommandResult::success(
                "tenant",
                format!("email `{normalized}` allowed for `{id}`"),
            ))
        }
        TenantAction::RemoveEmail { id, email } => {
            directory.remove_email(&CustomerId(id.clone()), &email).await?;
            Ok(CommandResult::success("tenant", format!("email removed from `{id}`")))
        }
    }
}

pub(crate) fn directory_failure(command: &str, error: DirectoryError) -> CommandResult {
    let error_class = match &error {
        DirectoryError::TenantNotFound(_) => "not_found",
        DirectoryError::TenantExists(_) | DirectoryError::Conflict { .. } => "conflict",
        DirectoryError::InvalidRule(_) => "invalid_rule",
        DirectoryError::Repository(_) => "db",
    };
    CommandResult::failure(command, error_class, error.to_string(), exit_codes::DIRECTORY)
}
