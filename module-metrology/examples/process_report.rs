//! Process a CMM report and print the derived metrics and verdict.
//! Run with: cargo run --example process_report [path/to/report.txt] [positions_dir]

use module_metrology::prelude::*;
use module_metrology::record::format_category;
use std::path::{Path, PathBuf};

fn main() -> Result<(), MetrologyError> {
    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .unwrap_or_else(|| "tests/fixtures/R0_sample.txt".to_string());
    let positions_dir = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tests/fixtures/positions"));
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example process_report [path/to/report.txt] [positions_dir]");
        std::process::exit(1);
    }

    let config = SiteConfig {
        positions_dir,
        ..SiteConfig::default()
    };
    let outcome = MetrologyCore::new(config)?.process_file(path, &ProcessOptions::default())?;
    let results = &outcome.record.results;

    println!("Results for {} ({})", outcome.record.component, path.display());
    let sections = [
        ("Hybrid positions", format_category(results.hybrid_position.as_ref())),
        ("PB positions", format_category(results.pb_position.as_ref())),
        ("Cap heights", format_category(results.cap_height.as_ref())),
        ("Hybrid glue", format_category(results.hybrid_glue_thickness.as_ref())),
        ("PB glue", format_category(results.pb_glue_thickness.as_ref())),
    ];
    for (title, body) in sections {
        println!("\n{}:", title);
        print!("{}", body.unwrap_or_else(|| "None\n".to_string()));
    }
    match results.shieldbox_height {
        Some(height) => println!("\nShield box height: {}", height),
        None => println!("\nShield box height: None"),
    }

    println!();
    for message in outcome.verdict.messages() {
        println!("{}", message);
    }
    println!("{}", outcome.verdict.summary());
    Ok(())
}
