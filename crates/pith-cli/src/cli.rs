use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "pith",
    about = "Pith: content-addressed object storage with versioning and quotas",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file with `[backend]` and `[identity]` sections
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file (or stdin) as a new object version
    Put(PutArgs),
    /// Read an object version to a file (or stdout)
    Get(GetArgs),
    /// Delete an object, keeping its history
    Rm(PathArg),
    /// Copy the current version of an object
    Cp(CpArgs),
    /// List the versions of an object
    Versions(PathArg),
    /// List containers of an account, or objects of a container
    Ls(ScopeArgs),
    /// Show usage of an account or container
    Usage(ScopeArgs),
    /// Show or set quota limits
    Quota(QuotaArgs),
    /// Purge historical versions of an object
    Purge(PurgeArgs),
    /// Delete unreferenced blocks
    Gc,
    /// Expose an object under a public token
    Publish(PathArg),
    /// Withdraw an object's public token
    Unpublish(PathArg),
    /// Show the user behind a token
    Whoami(WhoamiArgs),
    /// Look up the uuid of a user name
    Uuid(LookupArgs),
    /// Look up the user name of a uuid
    Name(LookupArgs),
}

#[derive(Args)]
pub struct PathArg {
    /// Object path: account/container/name
    pub path: String,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: String,
    /// Input file; stdin if omitted
    pub file: Option<PathBuf>,
    #[arg(long)]
    pub content_type: Option<String>,
    /// Metadata entry as key=value (repeatable)
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
    #[arg(long, conflicts_with = "as_of")]
    pub serial: Option<u64>,
    /// Latest version modified at or before this time (ms since epoch)
    #[arg(long)]
    pub as_of: Option<u64>,
    /// Output file; stdout if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct CpArgs {
    pub src: String,
    pub dst: String,
}

#[derive(Args)]
pub struct ScopeArgs {
    pub account: String,
    pub container: Option<String>,
}

#[derive(Args)]
pub struct QuotaArgs {
    pub account: String,
    pub container: Option<String>,
    /// New byte limit (0 = unlimited)
    #[arg(long)]
    pub max_bytes: Option<u64>,
    /// New object-count limit (0 = unlimited)
    #[arg(long)]
    pub max_objects: Option<u64>,
}

#[derive(Args)]
pub struct PurgeArgs {
    pub path: String,
    /// Purge versions modified before this time (ms since epoch)
    #[arg(long, conflicts_with_all = ["keep", "all"])]
    pub before: Option<u64>,
    /// Keep only the newest N versions
    #[arg(long, conflicts_with = "all")]
    pub keep: Option<usize>,
    /// Purge every version, including the current one
    #[arg(long)]
    pub all: bool,
}

#[derive(Args)]
pub struct WhoamiArgs {
    #[arg(long)]
    pub token: String,
    /// Include resource usage
    #[arg(long)]
    pub usage: bool,
}

#[derive(Args)]
pub struct LookupArgs {
    #[arg(long)]
    pub token: String,
    pub value: String,
    /// Use the service catalog endpoint
    #[arg(long)]
    pub service: bool,
}
