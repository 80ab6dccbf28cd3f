use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "git-annex-remote-ria",
    about = "git-annex special remote for RIA stores (externaltype=ria)",
    long_about = "Without a subcommand, speaks the git-annex external special remote \
                  protocol on stdin/stdout.",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show where a repository and its objects live in a store
    Locate(LocateArgs),
}

#[derive(Args)]
pub struct LocateArgs {
    /// Absolute base path of the store
    #[arg(long)]
    pub base_path: String,
    /// Repository identifier (the remote's archive-id)
    #[arg(long)]
    pub id: String,
    /// Annex key to locate
    #[arg(long)]
    pub key: Option<String>,
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}
