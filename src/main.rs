//! factrack - command-line client for the factory production-tracking platform

use clap::Parser;

mod cli;
mod output;

use cli::{CacheCommands, Cli, Commands, GlobalOptions, OrgCommands, SessionCommands, entity};
use factrack::entity::{Department, Factory, Line, Role, Team};
use factrack::error::Result;
use factrack::permission::PermissionCheck;

/// Exit code for a permission check that was denied
const EXIT_DENIED: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(EXIT_DENIED),
        Err(err) => {
            eprintln!("Error: {}", err);
            std::process::exit(1);
        }
    }
}

/// Dispatch the parsed command. `Ok(false)` means a check was denied.
async fn run(cli: Cli) -> Result<bool> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Login { username, password } => {
            cli::auth::login(&opts, username, password).await?
        }
        Commands::Logout { all } => cli::auth::logout(&opts, all).await?,
        Commands::Whoami => cli::auth::whoami(&opts).await?,
        Commands::Status => cli::status::run(&opts)?,
        Commands::Check {
            permission,
            page,
            feature,
            all_of,
            any_of,
        } => {
            let check = PermissionCheck {
                permission,
                page,
                feature,
                all_of,
                any_of,
            };
            return cli::check::run(&opts, check).await;
        }
        Commands::Session(command) => match command {
            SessionCommands::Level { level } => cli::session::level(&opts, level).await?,
            SessionCommands::Touch => cli::session::touch(&opts).await?,
            SessionCommands::Check => cli::session::check(&opts).await?,
        },
        Commands::Dept(command) => entity::run::<Department>(&opts, command).await?,
        Commands::Factory(command) => entity::run::<Factory>(&opts, command).await?,
        Commands::Line(command) => entity::run::<Line>(&opts, command).await?,
        Commands::Team(command) => entity::run::<Team>(&opts, command).await?,
        Commands::Role(command) => entity::run::<Role>(&opts, command).await?,
        Commands::Org(command) => match command {
            OrgCommands::Tree => cli::org::tree(&opts).await?,
            OrgCommands::Managers { department_id } => {
                cli::org::managers(&opts, &department_id).await?
            }
        },
        Commands::Cache(CacheCommands::Stats { warm }) => cli::cache::stats(&opts, warm).await?,
        Commands::Completion { shell } => cli::completions::run(shell),
    }

    Ok(true)
}
