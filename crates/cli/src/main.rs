mod commands;
mod services;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "empsync", version, about = "Employee record reconciliation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create new employees in the target system
    Run(commands::RunArgs),
    /// Apply a change feed to existing employees
    Update(commands::UpdateArgs),
    /// Terminate employees and disable their logins
    Disable(commands::DisableArgs),
    /// Print the submission plan, and the creation batches for a record feed
    Plan(commands::PlanArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Run(args) => commands::run(args).await,
        Command::Update(args) => commands::update(args).await,
        Command::Disable(args) => commands::disable(args).await,
        Command::Plan(args) => commands::plan(args),
    };
    if let Err(err) = result {
        tracing::error!("{err}");
        std::process::exit(1);
    }
}
