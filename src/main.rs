use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use keyroster::{Aggregation, Config, Grammar, UnparsablePolicy, Validator, batch, table};
use tracing_subscriber::EnvFilter;

/// Check a roster of declared OpenPGP keys against public keyservers
#[derive(Parser, Debug)]
#[command(name = "keyroster")]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "KEYROSTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify every declaration in the key directory
    Check(CheckArgs),
    /// Fail if a key declaration sits outside the key directory
    Misplaced(MisplacedArgs),
    /// Print the roster as a markdown table
    Table(TableArgs),
}

#[derive(clap::Args, Debug)]
struct CheckArgs {
    /// Directory with one declaration per key
    #[arg(short, long, env = "KEYROSTER_KEY_DIR")]
    key_dir: Option<PathBuf>,

    /// Per-request keyserver timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Keyserver endpoint (repeatable; replaces the configured list)
    #[arg(long = "keyserver")]
    keyservers: Vec<String>,

    /// User ID grammar (repeatable, tried in order)
    #[arg(long = "grammar", value_enum)]
    grammars: Vec<Grammar>,

    /// What to do with User IDs no grammar accepts
    #[arg(long, value_enum)]
    unparsable: Option<UnparsablePolicy>,

    /// Reporting policy for failing files
    #[arg(long, value_enum)]
    aggregation: Option<Aggregation>,
}

#[derive(clap::Args, Debug)]
struct MisplacedArgs {
    /// Directory whose top-level files are scanned
    #[arg(default_value = ".")]
    root: PathBuf,
}

#[derive(clap::Args, Debug)]
struct TableArgs {
    /// Directory with one declaration per key
    #[arg(short, long, env = "KEYROSTER_KEY_DIR")]
    key_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyroster=info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> keyroster::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Check(args) => {
            apply_check_args(&mut config, args);
            check(&config).await
        }
        Commands::Misplaced(args) => misplaced(&config, &args.root).await,
        Commands::Table(args) => {
            let key_dir = args.key_dir.unwrap_or(config.key_dir);
            let previous: HashSet<String> = config.previous_attendees.into_iter().collect();
            print!("{}", table::table_for_dir(&key_dir, &previous).await?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn apply_check_args(config: &mut Config, args: CheckArgs) {
    if let Some(dir) = args.key_dir {
        config.key_dir = dir;
    }
    if let Some(secs) = args.timeout {
        config.request_timeout_secs = secs;
    }
    if !args.keyservers.is_empty() {
        config.keyservers = args.keyservers;
    }
    if !args.grammars.is_empty() {
        config.grammars = args.grammars;
    }
    if let Some(policy) = args.unparsable {
        config.unparsable_identity = policy;
    }
    if let Some(aggregation) = args.aggregation {
        config.aggregation = aggregation;
    }
}

async fn check(config: &Config) -> keyroster::Result<ExitCode> {
    let validator = Validator::from_config(config)?;
    let report = batch::validate_dir(&validator, &config.key_dir, config.aggregation).await?;

    if report.is_success() {
        println!("checked {} keys", report.checked());
        return Ok(ExitCode::SUCCESS);
    }

    for (path, error) in report.failures() {
        eprintln!("{}: {error}", path.display());
    }
    Ok(ExitCode::FAILURE)
}

async fn misplaced(config: &Config, root: &Path) -> keyroster::Result<ExitCode> {
    let report = batch::scan_misplaced(root, &config.misplaced_allow_list).await?;

    if report.is_success() {
        println!("scanned {} files, no misplaced keys", report.checked());
        return Ok(ExitCode::SUCCESS);
    }

    for (_, error) in report.failures() {
        eprintln!("{error}");
    }
    Ok(ExitCode::FAILURE)
}
