//! Example: adding a site-specific tolerance check next to the built-in ones.
//! Run with: cargo run --example custom_checks [path/to/report.txt]

use module_metrology::compliance::tolerance::{Issue, ToleranceCheck};
use module_metrology::prelude::*;
use module_metrology::record::MetrologyResults;
use std::path::Path;
use std::sync::Arc;

/// Flags capacitors standing taller than `max_height` µm.
struct CapHeightCheck {
    max_height: f64,
}

impl ToleranceCheck for CapHeightCheck {
    fn id(&self) -> &str {
        "cap_height"
    }

    fn name(&self) -> &str {
        "Capacitor height"
    }

    fn describe(&self) -> String {
        format!("height < {} µm", self.max_height)
    }

    fn check(&self, results: &MetrologyResults) -> Option<Issue> {
        let offenders: Vec<String> = results
            .cap_height
            .as_ref()?
            .iter()
            .filter(|(_, &h)| h >= self.max_height)
            .map(|(name, _)| name.clone())
            .collect();
        if offenders.is_empty() {
            return None;
        }
        Some(Issue {
            check_id: self.id().to_string(),
            message: format!("Failure - Capacitor too high ({})", offenders.join(", ")),
            points: offenders,
        })
    }
}

fn main() -> Result<(), MetrologyError> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures/R0_sample.txt".to_string());
    let path = Path::new(&path);

    if !path.exists() {
        eprintln!("File not found: {}", path.display());
        eprintln!("Usage: cargo run --example custom_checks [path/to/report.txt]");
        std::process::exit(1);
    }

    let config = SiteConfig {
        positions_dir: "tests/fixtures/positions".into(),
        ..SiteConfig::default()
    };
    let core = MetrologyCore::new(config)?;
    let outcome = core.process_file(path, &ProcessOptions::default())?;

    // Re-evaluate the assembled record with one extra check
    let mut evaluator = ToleranceEvaluator::from_config(core.config());
    evaluator.add_check(Arc::new(CapHeightCheck { max_height: 200.0 }));
    let verdict = evaluator.evaluate(&outcome.record.results);

    println!("{} checks on {}", evaluator.checks().len(), path.display());
    for issue in &verdict.issues {
        println!("  [{}] {}", issue.check_id, issue.message);
    }
    println!("{}", verdict.summary());
    Ok(())
}
