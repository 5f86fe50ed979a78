mod cli;
mod config;
mod download;
mod error;
mod install;
mod meter;
mod platform;
mod types;


use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use config::{load_settings, Settings};
use error::Error;
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return handle_parse_error(err),
    };

    if let Err(e) = setup_logging(&cli) {
        report_failure(&format!("{:#}", e));
        return ExitCode::from(1);
    }

    let settings = match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            report_failure(&format!("{:#}", e));
            return ExitCode::from(1);
        }
    };
    tracing::debug!("Settings: {:?}", settings);

    let result = tokio::select! {
        result = dispatch(&cli.command, &settings) => result,
        Ok(()) = tokio::signal::ctrl_c() => Err(Error::Cancelled),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_expected() => {
            println!("{}", e);
            ExitCode::from(e.exit_code())
        }
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            report_failure(&e.to_string());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn dispatch(command: &Commands, settings: &Settings) -> error::Result<()> {
    match command {
        Commands::List => {
            for name in install::list_releases(settings).await? {
                println!("{}", name);
            }
        }
        Commands::Install { version } => {
            install::install_release(settings, version.as_deref()).await?;
        }
    }
    Ok(())
}

fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Could not set up logging: {}", e))
}

/// Prints `error: <message>` on stderr followed by the usage text on stdout.
fn report_failure(message: &str) {
    eprintln!(
        "{} {}",
        console::style("error:").for_stderr().red().bold(),
        message
    );
    println!("\n{}", Cli::command().render_help());
}

fn handle_parse_error(err: clap::Error) -> ExitCode {
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = err.print();
            ExitCode::SUCCESS
        }
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            report_failure("a subcommand is required");
            ExitCode::from(1)
        }
        _ => {
            let rendered = err.render().to_string();
            let message = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ");
            report_failure(message);
            ExitCode::from(1)
        }
    }
}
