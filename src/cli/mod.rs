//! CLI command definitions and handlers

use clap::{Parser, Subcommand};
pub use clap_complete::Shell;

use factrack::session::SecurityLevel;

pub mod args;
pub mod auth;
pub mod cache;
pub mod check;
pub mod completions;
pub mod context;
pub mod entity;
pub mod org;
pub mod session;
pub mod status;

pub use args::{CreateArgs, GlobalOptions, ListArgs, OutputFormat, UpdateArgs};
pub use context::CommandContext;

/// factrack - command-line client for the factory production-tracking platform
#[derive(Parser, Debug)]
#[command(name = "factrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (pretty, table, json)
    #[arg(
        long,
        global = true,
        env = "FACTRACK_FORMAT",
        hide_env = true,
        hide_possible_values = true
    )]
    pub format: Option<OutputFormat>,

    /// Override config file location
    #[arg(long, global = true, env = "FACTRACK_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Backend host, e.g. https://factory.example.com
    #[arg(long, global = true, env = "FACTRACK_API_HOST", hide_env = true)]
    pub api_host: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "FACTRACK_DEBUG", hide_env = true)]
    pub debug: bool,

    /// Bypass cached responses, fetch fresh data from the API
    #[arg(long, global = true, env = "FACTRACK_NO_CACHE", hide_env = true)]
    pub no_cache: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in
    Login {
        /// Username (employee code)
        #[arg(long, short = 'u')]
        username: Option<String>,

        /// Password; prompted for when omitted
        #[arg(long, env = "FACTRACK_PASSWORD", hide_env = true)]
        password: Option<String>,
    },

    /// Sign out
    Logout {
        /// Sign out of every device
        #[arg(long)]
        all: bool,
    },

    /// Show the signed-in user
    Whoami,

    /// Show authentication, session and configuration status
    Status,

    /// Check the signed-in user's access
    ///
    /// Only the first given criterion decides, in the order
    /// permission, page, feature, all-of, any-of. Exits 1 when denied.
    Check {
        /// Permission code, e.g. department.delete
        #[arg(long)]
        permission: Option<String>,

        /// Page code
        #[arg(long)]
        page: Option<String>,

        /// Feature code
        #[arg(long)]
        feature: Option<String>,

        /// Every listed permission is required
        #[arg(long, value_delimiter = ',')]
        all_of: Vec<String>,

        /// Any listed permission is enough
        #[arg(long, value_delimiter = ',')]
        any_of: Vec<String>,
    },

    /// Inspect and configure the inactivity timeout
    #[command(subcommand)]
    Session(SessionCommands),

    /// Manage departments
    #[command(subcommand)]
    Dept(EntityCommands),

    /// Manage factories
    #[command(subcommand)]
    Factory(EntityCommands),

    /// Manage production lines
    #[command(subcommand)]
    Line(EntityCommands),

    /// Manage teams
    #[command(subcommand)]
    Team(EntityCommands),

    /// Manage roles
    #[command(subcommand)]
    Role(EntityCommands),

    /// Organisation structure
    #[command(subcommand)]
    Org(OrgCommands),

    /// Response cache
    #[command(subcommand)]
    Cache(CacheCommands),

    /// Generate shell completion script
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Show or set the security level
    Level {
        /// New level (low, medium, high, strict)
        #[arg(value_enum)]
        level: Option<SecurityLevel>,
    },

    /// Record activity now
    Touch,

    /// Show idle time against the current level's threshold
    Check,
}

/// CRUD subcommands shared by every record type
#[derive(Subcommand, Debug)]
pub enum EntityCommands {
    /// List records
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show one record
    Get {
        /// Record ID
        id: String,
    },

    /// Create a record
    Create(CreateArgs),

    /// Update fields of a record
    Update {
        /// Record ID
        id: String,

        #[command(flatten)]
        changes: UpdateArgs,
    },

    /// Delete a record
    #[command(visible_alias = "rm")]
    Delete {
        /// Record ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
}

/// Organisation subcommands
#[derive(Subcommand, Debug)]
pub enum OrgCommands {
    /// Factory, department, line and team hierarchy
    Tree,

    /// Managers of a department
    Managers {
        /// Department ID
        department_id: String,
    },
}

/// Cache subcommands
#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show cache TTLs per record type
    Stats {
        /// Fetch the first page of every type first and report occupancy
        #[arg(long)]
        warm: bool,
    },
}
