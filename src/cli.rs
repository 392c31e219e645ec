use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "catalog-updater")]
#[command(about = "Classify a file tree and keep the catalog database in sync", long_about = None)]
pub struct Cli {
    /// Configuration file to use instead of ./Config.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the scheduled worker until interrupted
    Run,
    /// Run one new-files scan cycle now
    Scan,
    /// Synchronize classifications with the mapping file
    SyncClassifications,
    /// Mark files that no longer exist as deleted
    SoftDelete,
    /// Remove files soft-deleted longer than the retention period
    HardDelete,
    /// List classifications and their keyword fragments
    ListClassifications,
    /// Print configuration values
    PrintConfig,
    /// Truncate all database tables
    TruncateDb,
}
