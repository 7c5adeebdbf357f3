mod cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use directories::ProjectDirs;
use profile_core::ProfileError;
use tracing_error::ErrorLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "profile", about = "Inspect and package compliance profiles")]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a profile's metadata and controls, printing a structured report.
    Check {
        target: String,
        #[arg(long)]
        json: bool,
    },
    /// Print a profile's normalized metadata and control catalog.
    Info {
        target: String,
        #[arg(long)]
        json: bool,
    },
    /// Package a profile into a .zip or .tar.gz archive.
    Archive {
        target: String,
        #[arg(long)]
        destination: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "zip")]
        format: cmd::archive::Format,
        #[arg(long)]
        overwrite: bool,
    },
    /// Resolve and print the locked dependency set for a profile.
    LockedDependencies { target: String },
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Subcommand)]
enum CacheCommand {
    /// List the contents of the vendor cache.
    Show,
    /// Delete every entry in the vendor cache.
    Reset,
}

fn vendor_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PROFILE_VENDOR_DIR") {
        return PathBuf::from(dir);
    }
    ProjectDirs::from("dev", "profile-core", "profile")
        .map(|dirs| dirs.cache_dir().join("vendor"))
        .unwrap_or_else(|| PathBuf::from(".profile-vendor"))
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match (verbose, quiet) {
        (0, 0) => "warn",
        (1, 0) => "info",
        (_, 0) => "debug",
        (_, _) => "error",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .init();
}

/// `0 = success; 1 = validation errors present; 2 = fetch/resolution
/// failure; 3 = unexpected internal error` — `check()`'s own report, not
/// this mapping, is what signals exit code 1; a `ProfileError` reaching
/// `main` is always either a fetch/resolution failure or unexpected.
fn exit_code(err: &ProfileError) -> i32 {
    match err {
        ProfileError::Fetch(_) | ProfileError::Resolve(_) => 2,
        ProfileError::Structure(_)
        | ProfileError::Metadata(_)
        | ProfileError::Cache(_)
        | ProfileError::Archive(_)
        | ProfileError::Io(_) => 3,
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Command::Check { target, json } => cmd::check::run(&target, json),
        Command::Info { target, json } => cmd::info::run(&target, json),
        Command::Archive {
            target,
            destination,
            format,
            overwrite,
        } => cmd::archive::run(&target, destination, format, overwrite),
        Command::LockedDependencies { target } => {
            cmd::locked_dependencies::run(&target, &vendor_dir())
        }
        Command::Cache(CacheCommand::Show) => cmd::cache::show(&vendor_dir()),
        Command::Cache(CacheCommand::Reset) => cmd::cache::reset(&vendor_dir()),
    };

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Some(profile_err) = err.downcast_ref::<ProfileError>() {
                eprintln!("error: {profile_err}");
                std::process::exit(exit_code(profile_err));
            }
            Err(err)
        }
    }
}
