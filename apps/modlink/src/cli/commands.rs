//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use crate::driver::{self, RunReport};
use crate::error::AppError;
use modlink_core::{Identifier, base_path, normalize, resolve_relative};
use std::path::Path;

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Resolve the graph reachable from `entries`.
///
/// Fails with [`AppError::Incomplete`] when any module is left failed or
/// pending, after the report has been printed.
pub async fn cmd_run(
    entries: &[String],
    base_dir: &Path,
    config: &AppConfig,
    json_mode: bool,
    verbose: bool,
) -> Result<(), AppError> {
    let ids = entries
        .iter()
        .map(|entry| driver::entry_identifier(entry, base_dir))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!(
        entries = ids.len(),
        cycle_policy = %config.resolver.cycle_policy,
        failure_policy = %config.resolver.failure_policy,
        "starting run"
    );
    let report = driver::run(&ids, config).await?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&report_json(&report)).unwrap_or_default()
        );
    } else {
        print_report(&report, verbose);
    }

    if report.is_complete() {
        Ok(())
    } else {
        Err(AppError::Incomplete {
            failed: report.failed.len(),
            pending: report.pending.len(),
        })
    }
}

fn report_json(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "complete": report.is_complete(),
        "resolution_order": report.resolution_order,
        "modules": report.modules,
        "pending": report.pending,
        "failed": report
            .failed
            .iter()
            .map(|(id, reason)| serde_json::json!({ "id": id, "reason": reason }))
            .collect::<Vec<_>>(),
        "callback_failures": report
            .callback_failures
            .iter()
            .map(|f| serde_json::json!({ "module": f.module, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    })
}

fn print_report(report: &RunReport, verbose: bool) {
    println!("modlink Run");
    println!("===========");
    println!();
    println!("Resolution order:");
    for (n, id) in report.resolution_order.iter().enumerate() {
        println!("  {:>3}. {}", n + 1, id);
    }

    println!();
    println!("Modules:");
    for module in &report.modules {
        if module.top_level && !verbose && module.exports.is_empty() {
            continue;
        }
        println!("  {} [{}]", module.id, module.state);
        for (name, value) in &module.exports {
            println!("      {} = {}", name, value);
        }
    }

    if !report.pending.is_empty() {
        println!();
        println!("Stalled:");
        for pending in &report.pending {
            if pending.defined {
                let awaiting: Vec<&str> = pending.awaiting.iter().map(Identifier::as_str).collect();
                println!("  {} waiting on [{}]", pending.id, awaiting.join(", "));
            } else {
                println!("  {} (never loaded)", pending.id);
            }
        }
    }

    if !report.failed.is_empty() {
        println!();
        println!("Failed:");
        for (id, reason) in &report.failed {
            println!("  {}: {}", id, reason);
        }
    }

    for failure in &report.callback_failures {
        println!("  callback of {} failed: {}", failure.module, failure.error);
    }
}

// =============================================================================
// RESOLVE COMMAND
// =============================================================================

/// Print the canonical identifier of `specifier` and its base path.
pub fn cmd_resolve(specifier: &str, base: Option<&str>, json_mode: bool) -> Result<(), AppError> {
    let id = match base {
        Some(base) => {
            let base = Identifier::parse(base)?;
            resolve_relative(&base_path(&base), specifier)?
        }
        None => normalize(specifier)?,
    };
    let base = base_path(&id);

    if json_mode {
        let output = serde_json::json!({
            "specifier": specifier,
            "id": id,
            "base": base,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Identifier: {}", id);
    println!("Base:       {}", base);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
