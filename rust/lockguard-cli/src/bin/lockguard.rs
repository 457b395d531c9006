//! Lockguard CLI: verifies a composer.lock against its composer.json and the
//! package metadata of its repositories.

use lockguard_cli::colors::{bold, diff, failure_label, gray, red, status_label, yellow};
use lockguard_cli::commands::{self, ValidateFlags, ValidateOptions};
use lockguard_cli::config::LockguardConfig;
use lockguard_cli::CliError;

use clap::{Parser as ClapParser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(
    name = "lockguard",
    version,
    about = "Verify a composer.lock against its composer.json and package metadata",
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}

Examples:
  lockguard validate                              Validate every locked package
  lockguard validate --repository packages.json   Add a local metadata source
  lockguard validate --trusted-lock old.lock --touched vendor/pkg
                                                  Validate an update of vendor/pkg
  lockguard why vendor/pkg                        Show what requires vendor/pkg
"
)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Configuration file (default: lockguard.toml in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a lock file
    Validate(ValidateFlags),
    /// Show which packages require a locked package
    Why {
        /// Package name
        package: String,
        /// Path to composer.json
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Path to composer.lock
        #[arg(long)]
        lock: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lockguard=warn,lockguard_cli=warn,lockguard_core=warn",
        1 => "lockguard=debug,lockguard_cli=debug,lockguard_core=debug",
        _ => "lockguard=trace,lockguard_cli=trace,lockguard_core=trace",
    };
    let filter =
        EnvFilter::try_from_env("LOCKGUARD_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<LockguardConfig, CliError> {
    match path {
        Some(path) => LockguardConfig::load_from(&path),
        None => LockguardConfig::load(),
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Validate(flags) => {
            let options = ValidateOptions::merge(&config, flags)?;
            let validated = commands::validate(&options)?;
            println!(
                "{} {} packages",
                status_label("Validated"),
                validated.packages
            );
        }
        Commands::Why {
            package,
            manifest,
            lock,
        } => {
            let flags = ValidateFlags {
                manifest,
                lock,
                ..ValidateFlags::default()
            };
            let options = ValidateOptions::merge(&config, flags)?;
            let dependents = commands::why(&options.manifest, &options.lock, &package)?;
            if dependents.is_empty() {
                println!("No locked package requires {}", bold(&package));
            }
            for dependent in dependents {
                let version = match &dependent.version {
                    Some(version) => version.clone(),
                    None => gray("(root)"),
                };
                println!(
                    "{} {} requires {} ({})",
                    bold(&dependent.name),
                    version,
                    dependent.target,
                    yellow(&dependent.constraint)
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    lockguard_cli::colors::init_from_env();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let label = if err.is_validation_failure() { "Invalid" } else { "Error" };
            let message = err.to_string();
            match message.split_once("\n\n") {
                Some((headline, details)) => {
                    eprintln!("{} {}\n\n{}", failure_label(label), red(headline), diff(details))
                }
                None => eprintln!("{} {}", failure_label(label), red(&message)),
            }
            ExitCode::FAILURE
        }
    }
}
