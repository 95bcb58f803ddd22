pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::tenant::TenantAction;
use commands::user::UserAction;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "Relay operator CLI",
    long_about = "Operate the relay gateway: migrations, config inspection, readiness checks, \
                  and tenant directory administration.",
    after_help = "Examples:\n  relay doctor --json\n  relay tenant add acme \"Acme Corp\" --endpoint https://acme.internal\n  relay tenant add-domain acme acme.co.jp"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, trust mode, identity provider, and DB connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(subcommand, about = "Administer tenants and their access rules")]
    Tenant(TenantAction),
    #[command(subcommand, about = "Inspect and bind user records")]
    User(UserAction),
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Tenant(action) => commands::tenant::run(action),
        Command::User(action) => commands::user::run(action),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
