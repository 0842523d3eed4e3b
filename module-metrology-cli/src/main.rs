//! Module Metrology CLI - evaluate CMM module reports from the command line.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use module_metrology::record::format_category;
use module_metrology::{
    BatchEntry, IdentityCorrector, MetrologyCore, MetrologyOutcome, ProcessOptions, SiteConfig,
    ToleranceEvaluator, UploadPayload,
};
use std::path::{Path, PathBuf};
use std::process;

/// Exit code when a report was evaluated but failed a tolerance check.
const EXIT_FAILED_CHECKS: i32 = 2;

#[derive(Parser)]
#[command(name = "module-metrology")]
#[command(about = "CMM module metrology report evaluation", long_about = None)]
#[command(version)]
struct Cli {
    /// Site configuration file (JSON); defaults are used when omitted
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding <MODULE_TYPE>_positions.csv reference tables
    #[arg(long, global = true, value_name = "DIR")]
    positions_dir: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single CMM report
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Skip tilt correction (heights taken as measured)
        #[arg(long)]
        no_tilt: bool,

        /// Record that there were problems during testing
        #[arg(long)]
        problems: bool,

        /// Write the upload payload (record + attachment) to this file
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Exit with code 2 if any tolerance check fails
        #[arg(long)]
        fail_on_failure: bool,
    },

    /// Evaluate every report in a directory
    Batch {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Skip tilt correction (heights taken as measured)
        #[arg(long)]
        no_tilt: bool,

        /// Record that there were problems during testing
        #[arg(long)]
        problems: bool,

        /// Exit with code 2 if any report fails a tolerance check
        #[arg(long)]
        fail_on_failure: bool,
    },

    /// List the tolerance checks (with -v, their bands)
    Checks,

    /// Print the effective site configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let exit_code = match cli.command {
        Commands::Check {
            ref file,
            ref format,
            no_tilt,
            problems,
            ref output,
            fail_on_failure,
        } => report_errors(handle_check(
            &cli,
            file,
            format,
            no_tilt,
            problems,
            output.as_deref(),
            fail_on_failure,
        )),
        Commands::Batch {
            ref dir,
            ref format,
            no_tilt,
            problems,
            fail_on_failure,
        } => report_errors(handle_batch(
            &cli,
            dir,
            format,
            no_tilt,
            problems,
            fail_on_failure,
        )),
        Commands::Checks => report_errors(handle_checks(&cli)),
        Commands::Config => report_errors(handle_config(&cli)),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn report_errors(result: anyhow::Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(e) => {
            // Library errors already embed their source in the message
            let mut message = e.to_string();
            for cause in e.chain().skip(1) {
                let cause = cause.to_string();
                if !message.contains(&cause) {
                    message = format!("{}: {}", message, cause);
                }
            }
            eprintln!("Error: {}", message);
            1
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<SiteConfig> {
    let mut config = match &cli.config {
        Some(path) => SiteConfig::load(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => SiteConfig::default(),
    };
    if let Some(dir) = &cli.positions_dir {
        config.positions_dir = dir.clone();
    }
    Ok(config)
}

fn build_core(cli: &Cli, no_tilt: bool) -> anyhow::Result<MetrologyCore> {
    let core = MetrologyCore::new(load_config(cli)?)?;
    Ok(if no_tilt {
        core.with_corrector(IdentityCorrector)
    } else {
        core
    })
}

fn handle_check(
    cli: &Cli,
    file: &Path,
    format: &OutputFormat,
    no_tilt: bool,
    problems: bool,
    output: Option<&Path>,
    fail_on_failure: bool,
) -> anyhow::Result<i32> {
    let core = build_core(cli, no_tilt)?;
    let outcome = core.process_file(file, &ProcessOptions { problems })?;

    match format {
        OutputFormat::Human => output_human(file, &outcome),
        OutputFormat::Json => {
            let json = serde_json::json!({
                "record": outcome.record,
                "verdict": outcome.verdict,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    if let Some(path) = output {
        let payload = UploadPayload::new(outcome.record.clone());
        std::fs::write(path, serde_json::to_string_pretty(&payload)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    if fail_on_failure && !outcome.passed() {
        return Ok(EXIT_FAILED_CHECKS);
    }
    Ok(0)
}

fn handle_batch(
    cli: &Cli,
    dir: &Path,
    format: &OutputFormat,
    no_tilt: bool,
    problems: bool,
    fail_on_failure: bool,
) -> anyhow::Result<i32> {
    let core = build_core(cli, no_tilt)?;
    let entries = core
        .process_directory(dir, &ProcessOptions { problems })
        .with_context(|| format!("failed to scan {}", dir.display()))?;

    match format {
        OutputFormat::Human => output_batch_human(&entries),
        OutputFormat::Json => output_batch_json(&entries)?,
    }

    let errors = entries.iter().filter(|e| e.outcome.is_err()).count();
    let failed = entries
        .iter()
        .filter(|e| matches!(&e.outcome, Ok(o) if !o.passed()))
        .count();

    if errors > 0 {
        Ok(1)
    } else if fail_on_failure && failed > 0 {
        Ok(EXIT_FAILED_CHECKS)
    } else {
        Ok(0)
    }
}

fn output_human(file: &Path, outcome: &MetrologyOutcome) {
    let record = &outcome.record;
    let results = &record.results;

    println!("\nFile: {}", file.display());
    println!("{}", "─".repeat(60));
    println!("  Component:   {}", record.component);
    println!("  Institution: {}", record.institution);
    println!("  Date:        {}", record.date);
    println!("  Run number:  {}", record.run_number);
    println!("  Operator:    {}", record.properties.operator);
    println!("  Machine:     {}", record.properties.machine);

    print_category("Hybrid positions (µm)", format_category(results.hybrid_position.as_ref()));
    print_category("Powerboard positions (µm)", format_category(results.pb_position.as_ref()));
    print_category("Capacitor heights (µm)", format_category(results.cap_height.as_ref()));
    print_category(
        "Hybrid glue thickness (µm)",
        format_category(results.hybrid_glue_thickness.as_ref()),
    );
    print_category(
        "Powerboard glue thickness (µm)",
        format_category(results.pb_glue_thickness.as_ref()),
    );
    match results.shieldbox_height {
        Some(height) => println!("\n  Shield box height (µm): {}", height),
        None => println!("\n  Shield box height (µm): None"),
    }

    if !outcome.verdict.issues.is_empty() {
        println!();
        for issue in &outcome.verdict.issues {
            println!("  {}", issue.message);
        }
    }
    println!("\n{}", outcome.verdict.summary());
}

fn print_category(title: &str, body: Option<String>) {
    println!("\n  {}:", title);
    match body {
        Some(lines) => {
            for line in lines.lines() {
                println!("    {}", line);
            }
        }
        None => println!("    None"),
    }
}

fn output_batch_human(entries: &[BatchEntry]) {
    for entry in entries {
        match &entry.outcome {
            Ok(outcome) if outcome.passed() => {
                println!("PASS   {}", entry.file.display())
            }
            Ok(outcome) => {
                println!("FAIL   {}", entry.file.display());
                for issue in &outcome.verdict.issues {
                    println!("         {}", issue.message);
                }
            }
            Err(e) => println!("ERROR  {}: {}", entry.file.display(), e),
        }
    }

    let passed = entries
        .iter()
        .filter(|e| matches!(&e.outcome, Ok(o) if o.passed()))
        .count();
    println!("\n{} of {} reports passed", passed, entries.len());
}

fn output_batch_json(entries: &[BatchEntry]) -> anyhow::Result<()> {
    let results: Vec<_> = entries
        .iter()
        .map(|entry| match &entry.outcome {
            Ok(outcome) => serde_json::json!({
                "file": entry.file.display().to_string(),
                "record": outcome.record,
                "verdict": outcome.verdict,
            }),
            Err(e) => serde_json::json!({
                "file": entry.file.display().to_string(),
                "error": e.to_string(),
            }),
        })
        .collect();

    let output = serde_json::json!({
        "results": results,
        "summary": {
            "total_files": entries.len(),
            "passed": entries.iter().filter(|e| matches!(&e.outcome, Ok(o) if o.passed())).count(),
            "failed": entries.iter().filter(|e| matches!(&e.outcome, Ok(o) if !o.passed())).count(),
            "errors": entries.iter().filter(|e| e.outcome.is_err()).count(),
        }
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn handle_checks(cli: &Cli) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    let evaluator = ToleranceEvaluator::from_config(&config);

    println!("Tolerance checks:\n");
    for check in evaluator.checks() {
        println!("  {:<24} {}", check.id(), check.name());
        if cli.verbose > 0 {
            println!("  {:<24} {}", "", check.describe());
        }
    }
    Ok(0)
}

fn handle_config(cli: &Cli) -> anyhow::Result<i32> {
    let config = load_config(cli)?;
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(0)
}
