use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cost_dashboard::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    // The server configures tracing from its own config section
    if !matches!(command, cli::Commands::Start) {
        init_tracing("warn", "text");
    }

    match command {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Test { credentials } => {
            commands::test::execute(&args.config, credentials).await?;
        }
        cli::Commands::Snapshot { pretty } => {
            commands::snapshot::execute(&args.config, pretty).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Cost Dashboard v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
