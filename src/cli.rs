use crate::config::loader::VerifierConfig;
use crate::config::validator::validate_config;
use crate::engine::{preflight, VerificationEngine};
use crate::observability::audit::init_audit_logger;
use crate::report::ReportGenerator;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Samples requested when neither `--samples` nor a config file says otherwise
const DEFAULT_CLI_SAMPLES: usize = 10;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Verify data generator submissions against quality standards",
    long_about = None
)]
pub struct Cli {
    /// Path to generator zip file (e.g., xx.zip)
    #[arg(long)]
    pub generator: PathBuf,
    /// Output report path
    #[arg(long, default_value = "verification_report.json")]
    pub output: PathBuf,
    /// Number of samples to generate and verify (default: 10)
    #[arg(long)]
    pub samples: Option<usize>,
    /// Enable verbose logging
    #[arg(long, short)]
    pub verbose: bool,
    /// Verifier configuration file (JSON)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Append structured audit events to this file (JSON lines)
    #[arg(long)]
    pub audit_log: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init();
}

fn load_config(cli: &Cli) -> Result<VerifierConfig> {
    let mut config = match &cli.config {
        Some(path) => VerifierConfig::load_from_file(path)?,
        None => VerifierConfig {
            num_samples: DEFAULT_CLI_SAMPLES,
            ..VerifierConfig::default()
        },
    };
    if let Some(samples) = cli.samples {
        config.num_samples = samples;
    }

    let validation = validate_config(&config)?;
    for warning in &validation.warnings {
        log::warn!("Config: {}", warning);
    }
    Ok(config)
}

/// Run the verifier; the returned value is the process exit code
pub fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    init_audit_logger(cli.audit_log.clone()).context("Failed to initialize audit logger")?;

    if let Err(e) = preflight(&cli.generator) {
        eprintln!("Error: {}", e);
        return Ok(1);
    }

    let config = load_config(&cli)?;
    let num_samples = config.num_samples;

    println!("Starting verification for: {}", cli.generator.display());
    println!("Will generate {} samples for testing", num_samples);
    println!("{}", "=".repeat(60));

    let engine = VerificationEngine::new(config);
    let result = engine.verify(&cli.generator, num_samples);

    ReportGenerator::save(&result, &cli.output)
        .with_context(|| format!("Failed to save report to {}", cli.output.display()))?;

    println!("\n{}", "=".repeat(60));
    println!("Verification complete!");
    println!("Report saved to: {}", cli.output.display());
    println!(
        "Overall Status: {}",
        if result.passed() { "PASS" } else { "FAIL" }
    );
    println!("Total Issues: {}", result.total_issues());
    println!("  - Critical: {}", result.critical_issues());
    println!("  - Warnings: {}", result.warning_issues());

    Ok(if result.passed() { 0 } else { 1 })
}
