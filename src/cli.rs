use clap::{Parser, Subcommand};

/// Warden — access-control core for a multi-tenant content API
#[derive(Parser)]
#[command(name = "wardend", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run migrations and the periodic abuse sweeper until interrupted
    Run,

    /// Execute one abuse sweep and exit
    Sweep,

    /// Manage credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand)]
pub enum CredentialCommands {
    /// Issue a new bearer credential
    Issue {
        #[arg(long)]
        owner: String,
        /// Grant the isGlobalAdmin attribute
        #[arg(long)]
        global_admin: bool,
    },
    /// Fetch one credential by id
    Get { id: String },
    /// List credentials, optionally filtered by owner
    Find {
        #[arg(long, value_delimiter = ',')]
        owner: Option<Vec<String>>,
        #[arg(long)]
        global_admin: Option<bool>,
        /// Resume after this credential id
        #[arg(long)]
        after: Option<String>,
    },
    /// Patch owner attributes on one credential
    Patch {
        id: String,
        #[arg(long)]
        owner: Option<String>,
        #[arg(long)]
        global_admin: Option<bool>,
    },
    /// Revoke one credential (idempotent)
    Revoke { id: String },
}
