use clap::{Parser, Subcommand};

fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // A git tag at HEAD means a release build
    if let Some(tag) = option_env!("DEBREL_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("DEBREL_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("DEBREL_GIT_BRANCH").unwrap_or("unknown");

    // Leaked once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser, Debug)]
#[command(name = "debrel")]
#[command(about = "Install Debian packages published as GitHub release assets")]
#[command(version = get_version())]
pub struct Cli {
    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// List releases that ship the configured package, newest first
    List,

    /// Download and install a release
    #[command(after_help = "Examples:\n  debrel install\n  debrel install latest\n  debrel install v1.60.0")]
    Install {
        /// Release name to install, or 'latest'
        version: Option<String>,
    },
}
