use anyhow::Result;
use tabled::{Table, Tabled, settings::Style};

use slimify_core::models::{Severity, ViolationType};
use slimify_core::service::TrackerService;

use super::helpers::{print_json, truncate};

/// Exit code when a critical warning is found, so scripts can react.
const CRITICAL_EXIT: i32 = 3;

pub(crate) async fn cmd_safety_check(service: &TrackerService, json: bool) -> Result<()> {
    let report = service.evaluate_today_safety().await?;
    let critical = report
        .warnings
        .iter()
        .any(|w| w.severity == Severity::Critical);

    if json {
        print_json(&report)?;
    } else if report.safe && report.warnings.is_empty() {
        println!("All clear for today.");
    } else {
        for w in &report.warnings {
            let label = match w.severity {
                Severity::Caution => "CAUTION",
                Severity::Critical => "CRITICAL",
            };
            println!("  [{label}] {}", w.message);
        }
    }

    if critical {
        std::process::exit(CRITICAL_EXIT);
    }
    Ok(())
}

pub(crate) async fn cmd_safety_list(
    service: &TrackerService,
    kind: Option<ViolationType>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let violations = service.safety_violations(kind, limit).await?;

    if json {
        return print_json(&violations);
    }
    if violations.is_empty() {
        eprintln!("No safety violations recorded.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct ViolationRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Type")]
        kind: String,
        #[tabled(rename = "Details")]
        details: String,
    }

    let rows: Vec<ViolationRow> = violations
        .iter()
        .map(|v| ViolationRow {
            id: v.id.map(|id| id.to_string()).unwrap_or_default(),
            date: v.date.format("%Y-%m-%d").to_string(),
            kind: v.violation_type.to_string(),
            details: truncate(&v.details, 60),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}
