//! # Driver
//!
//! Runs a set of entry units to quiescence.
//!
//! The [`Context`] never leaves the driver: it is single-threaded and all
//! bookkeeping happens here, one completion at a time. Only fetches are
//! spawned. A completion is handed to the context as
//! `announce` → execute the unit → `finish_load`, so at most one module is
//! ever in progress.

use crate::config::AppConfig;
use crate::error::AppError;
use crate::loader::{self, Fetcher};
use crate::unit::UnitSource;
use modlink_core::{CallbackFailure, Context, Identifier, ModuleState, PendingModule};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use url::Url;

// =============================================================================
// REPORT
// =============================================================================

/// One module as it stands when the run went quiet.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleReport {
    pub id: Identifier,
    #[serde(flatten)]
    pub state: ModuleState,
    pub top_level: bool,
    pub exports: BTreeMap<String, serde_json::Value>,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Identifiers in the order they became resolved.
    pub resolution_order: Vec<Identifier>,
    /// Every registered module, ordered by identifier.
    pub modules: Vec<ModuleReport>,
    /// Unresolved modules and what they still wait on.
    pub pending: Vec<PendingModule>,
    /// Failed modules with their reasons.
    pub failed: Vec<(Identifier, String)>,
    /// Require callbacks that reported failure.
    pub callback_failures: Vec<CallbackFailure>,
}

impl RunReport {
    /// True when every module resolved and no callback failed.
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty() && self.failed.is_empty() && self.callback_failures.is_empty()
    }

    fn collect(ctx: &mut Context) -> Self {
        let modules = ctx
            .registry()
            .iter()
            .map(|module| ModuleReport {
                id: module.id().clone(),
                state: module.state().clone(),
                top_level: module.is_top_level(),
                exports: module.exports().snapshot(),
            })
            .collect();
        Self {
            resolution_order: ctx.resolution_order().to_vec(),
            modules,
            pending: ctx.pending_modules(),
            failed: ctx.failed_modules(),
            callback_failures: ctx.take_callback_failures(),
        }
    }
}

// =============================================================================
// ENTRIES
// =============================================================================

/// Turn a command-line entry into an identifier.
///
/// Entries containing `://` are taken as locators. Anything else is a path,
/// relative to `base_dir`.
pub fn entry_identifier(entry: &str, base_dir: &Path) -> Result<Identifier, AppError> {
    if entry.contains("://") {
        return Ok(Identifier::parse(entry)?);
    }

    let invalid = |reason: String| AppError::InvalidEntry {
        entry: entry.to_string(),
        reason,
    };
    let path = base_dir
        .join(entry)
        .canonicalize()
        .map_err(|e| invalid(e.to_string()))?;
    let url = Url::from_file_path(&path)
        .map_err(|()| invalid("path cannot be expressed as a file URL".to_string()))?;
    Ok(Identifier::parse(url.as_str())?)
}

// =============================================================================
// RUN
// =============================================================================

/// Register `entries` as top-level units, in order, and drive every load
/// they cause until nothing is left in flight.
pub async fn run(entries: &[Identifier], config: &AppConfig) -> Result<RunReport, AppError> {
    let fetcher = Fetcher::new(&config.loader)?;
    let (loader, requests) = loader::channel();
    let mut ctx = Context::new(loader, config.resolver.clone());

    // Entries are sequenced in argument order, so they are read one by one.
    for entry in entries {
        let source = fetcher
            .fetch(entry)
            .await
            .map_err(|reason| AppError::InvalidEntry {
                entry: entry.to_string(),
                reason,
            })?;
        let unit = UnitSource::parse(&source).map_err(|e| AppError::InvalidEntry {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;
        let id = unit.execute_top_level(&mut ctx, entry)?;
        tracing::info!(entry = %entry, unit = %id, "registered entry");
    }

    drive(&mut ctx, &fetcher, requests).await;

    let report = RunReport::collect(&mut ctx);
    tracing::info!(
        resolved = report.resolution_order.len(),
        pending = report.pending.len(),
        failed = report.failed.len(),
        "run finished"
    );
    Ok(report)
}

async fn drive(ctx: &mut Context, fetcher: &Fetcher, mut requests: UnboundedReceiver<Identifier>) {
    let mut in_flight: JoinSet<(Identifier, Result<String, String>)> = JoinSet::new();

    loop {
        while let Ok(id) = requests.try_recv() {
            let fetcher = fetcher.clone();
            in_flight.spawn(async move {
                let result = fetcher.fetch(&id).await;
                (id, result)
            });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        match joined {
            Ok((id, Ok(source))) => complete(ctx, &id, &source),
            Ok((id, Err(reason))) => record_failure(ctx, &id, reason),
            Err(e) => tracing::error!("fetch task aborted: {}", e),
        }
    }
}

/// Execute fetched source as the code of `id`.
fn complete(ctx: &mut Context, id: &Identifier, source: &str) {
    if let Err(e) = ctx.announce(id) {
        tracing::error!(module = %id, "announcement rejected: {}", e);
        return;
    }

    let executed = UnitSource::parse(source)
        .map_err(|e| format!("invalid unit: {e}"))
        .and_then(|unit| unit.execute(ctx).map_err(|e| e.to_string()));

    match executed {
        Ok(_) => {
            if let Err(e) = ctx.finish_load(id) {
                tracing::error!(module = %id, "finish_load failed: {}", e);
            }
        }
        Err(reason) => record_failure(ctx, id, reason),
    }
}

fn record_failure(ctx: &mut Context, id: &Identifier, reason: String) {
    tracing::warn!(module = %id, reason = %reason, "load failed");
    if let Err(e) = ctx.fail_load(id, reason) {
        tracing::error!(module = %id, "fail_load failed: {}", e);
    }
}
