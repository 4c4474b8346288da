pub mod audit;
pub mod batch;
pub mod orphans;
pub mod schema;
pub mod sync;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "proposal-sync",
    author,
    version,
    about = "Keep the proposal mirror in MongoDB consistent with PostgreSQL",
    long_about = "PostgreSQL holds the canonical proposals; MongoDB holds a mirror.\n\nEvery \
                  command reads its settings from defaults, the optional --config file and \
                  PG_/MG_/RD_/SY_/OB_ environment variables, in that order."
)]
pub struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(long, short, global = true, env = "PROPOSAL_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Sync one proposal between the stores")]
    Sync(sync::SyncArgs),

    #[command(about = "Sync many proposals, reporting failures per id")]
    Batch(batch::BatchArgs),

    #[command(about = "Check that one proposal agrees across both stores")]
    Validate(validate::ValidateArgs),

    #[command(about = "List proposals present in one store only")]
    Orphans(orphans::OrphansArgs),

    #[command(about = "Audit the organization name and proposal counts of an organization")]
    Audit(audit::AuditArgs),

    #[command(about = "Create the PostgreSQL tables and MongoDB indexes")]
    InitSchema(schema::InitSchemaArgs)
}
