use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "feed",
    about = "Content-addressed feed client: address derivation, media digests, and sync simulation",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Session configuration (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Derive the ledger address of a state, post, or comment record
    Derive(DeriveArgs),
    /// Compute the content digest of a media file
    Hash(HashArgs),
    /// Run racing clients against an in-memory ledger and print the converged feed
    Simulate(SimulateArgs),
    /// Print the effective session configuration
    Config,
}

#[derive(Args)]
pub struct DeriveArgs {
    #[command(subcommand)]
    pub target: DeriveTarget,

    /// Program identity (64 hex chars); overrides the configuration
    #[arg(long, global = true)]
    pub program: Option<String>,
}

#[derive(Subcommand, Clone, Copy)]
pub enum DeriveTarget {
    /// The global state record
    State,
    /// A post by index
    Post { index: u64 },
    /// A comment by post index and comment index
    Comment { post_index: u64, comment_index: u64 },
}

#[derive(Args)]
pub struct HashArgs {
    pub file: PathBuf,
}

#[derive(Args)]
pub struct SimulateArgs {
    /// Posts created by each client
    #[arg(long, default_value = "3")]
    pub posts: u64,
    /// Concurrent clients
    #[arg(long, default_value = "4")]
    pub clients: usize,
    /// Comments each client leaves on the first post
    #[arg(long, default_value = "1")]
    pub comments: u64,
    /// Entries of the converged feed to print
    #[arg(short = 'n', long, default_value = "10")]
    pub show: usize,
}
