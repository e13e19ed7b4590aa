use clap::{CommandFactory, Parser, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use repo_score::attributes::AttributeRegistry;
use repo_score::config;
use repo_score::interrupt::InterruptFlag;
use repo_score::output;
use repo_score::repository::{parse_repository_path, RepositoryTarget};
use repo_score::scoring::{self, RunError, ScoreError};

const EXIT_SUCCESS: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_ATTRIBUTE: i32 = 3;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    /// Just the total
    Text,
    /// Total plus per-attribute breakdown
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "repo-score")]
#[command(about = "Calculate the score of a repository.", long_about = None)]
#[command(version)]
struct Cli {
    /// Identifier for the repository as it appears in the datasource
    repository_id: i64,

    /// Path to the repository source code
    #[arg(value_parser = parse_repository_path)]
    repository_path: PathBuf,

    /// Path to the configuration file
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output format for the score
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Enable verbose logging and print the per-attribute breakdown to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }
}

/// First Ctrl+C asks the scorer to stop after the current attribute.
/// A second one exits immediately.
fn install_interrupt_handler(interrupt: &InterruptFlag) {
    let flag = interrupt.clone();
    let result = ctrlc::set_handler(move || {
        if flag.trigger() {
            eprintln!("Caught interrupt, exiting.");
            std::process::exit(EXIT_FAILURE);
        }
    });
    if let Err(e) = result {
        tracing::warn!("Failed to set Ctrl+C handler: {}", e);
    }
}

fn main() {
    // Bare invocation prints usage instead of clap's missing-argument error
    if std::env::args_os().len() <= 1 {
        let _ = Cli::command().print_help();
        std::process::exit(EXIT_FAILURE);
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let interrupt = InterruptFlag::new();
    install_interrupt_handler(&interrupt);

    let config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Malformatted or missing configuration: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    for (i, attribute) in config.attributes.iter().enumerate() {
        tracing::debug!(
            "Attribute {}: {} (enabled: {}, weight: {})",
            i + 1,
            attribute.name,
            attribute.enabled,
            attribute.weight
        );
    }

    let target = RepositoryTarget::new(cli.repository_id, cli.repository_path);
    let registry = AttributeRegistry::with_builtins();

    let result = match scoring::score_repository(&config, &target, &registry, &interrupt) {
        Ok(r) => r,
        Err(RunError::Connect(e)) => {
            eprintln!("Unable to establish connection to database: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
        Err(RunError::Score(ScoreError::Interrupted)) => {
            eprintln!("Caught interrupt, exiting.");
            std::process::exit(EXIT_FAILURE);
        }
        Err(RunError::Score(e @ ScoreError::AttributeFailed { .. })) => {
            eprintln!("Scoring aborted: {}", e);
            std::process::exit(EXIT_ATTRIBUTE);
        }
        Err(RunError::Score(e)) => {
            eprintln!("Scoring failed: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    if cli.verbose {
        eprintln!(
            "{}",
            output::format_breakdown(&result, output::should_use_colors())
        );
    }

    match cli.format {
        OutputFormat::Text => println!("{}", output::format_total(&result)),
        OutputFormat::Json => match output::format_json(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{:#}", e);
                std::process::exit(EXIT_FAILURE);
            }
        },
    }

    std::process::exit(EXIT_SUCCESS);
}
