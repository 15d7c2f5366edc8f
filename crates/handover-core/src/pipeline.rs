use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{HandoverConfig, ProcessingConfig};
use crate::db;
use crate::error::{HandoverError, Result};
use crate::expander::{expand_rows_parallel, UnresolvedIdentifier};
use crate::ingestion::{self, check_live_index_identifiers, LiveIndexViolation};
use crate::normalizer::normalize_rows;
use crate::resolver::{CachedDirectory, PgPortfolioDirectory, PortfolioDirectory};
use crate::snapshot::{self, CURRENTLY_WORKING_PREFIX, SNAPSHOT_PREFIX};
use crate::successor::with_successors;
use crate::types::{HandoverRow, RowOrigin, SourceRow};
use crate::upsert::{self, UpsertSummary};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Resolve and export, but leave the destination table untouched.
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub source_rows: usize,
    pub submitted_rows: usize,
    pub successor_rows: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<UnresolvedIdentifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub live_index_violations: Vec<LiveIndexViolation>,
    pub upsert: Option<UpsertSummary>,
    pub snapshot: PathBuf,
    pub currently_working_snapshot: PathBuf,
}

/// Rows ready for the destination: submitted rows first, then successors.
#[derive(Debug)]
pub struct PreparedRows {
    pub rows: Vec<HandoverRow>,
    pub unresolved: Vec<UnresolvedIdentifier>,
}

impl PreparedRows {
    pub fn submitted(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.origin == RowOrigin::Submitted)
            .count()
    }

    pub fn successors(&self) -> impl Iterator<Item = &HandoverRow> {
        self.rows.iter().filter(|r| r.origin == RowOrigin::Successor)
    }
}

/// Reports Live Index rows with badly filled identifier fields; fatal when
/// `strict` is set.
pub fn check_source(rows: &[SourceRow], strict: bool) -> Result<Vec<LiveIndexViolation>> {
    let violations = check_live_index_identifiers(rows);
    if violations.is_empty() {
        info!("Portfolio ID information for Live Indices is correctly formatted");
        return Ok(violations);
    }

    for violation in &violations {
        warn!(sequence = violation.sequence, issue = ?violation.issue, "{violation}");
    }

    if strict {
        let detail = violations
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(HandoverError::LiveIndexIdentifiers(detail));
    }

    Ok(violations)
}

/// Expansion, unresolved-policy enforcement, name normalisation and
/// successor derivation.
pub async fn prepare_rows(
    source: Vec<SourceRow>,
    directory: Arc<dyn PortfolioDirectory>,
    processing: &ProcessingConfig,
) -> Result<PreparedRows> {
    let policy = processing.unresolved_policy;
    let outcome = expand_rows_parallel(source, directory, processing.effective_workers(), policy).await?;
    let unresolved = outcome.unresolved.clone();

    let mut rows = outcome.enforce(policy)?;
    normalize_rows(&mut rows, processing.suffix_match);

    Ok(PreparedRows {
        rows: with_successors(rows),
        unresolved,
    })
}

pub async fn run(config: &HandoverConfig, options: &RunOptions) -> Result<RunReport> {
    let source = ingestion::read_source_file(&config.paths.input_file)?;
    let source_rows = source.len();
    let live_index_violations = check_source(&source, config.processing.strict_live_index_checks)?;

    let workers = config.processing.effective_workers();
    let reference_pool = db::connect(
        &config.reference_database_url()?,
        u32::try_from(workers).unwrap_or(u32::MAX),
    )
    .await?;
    let directory: Arc<dyn PortfolioDirectory> = Arc::new(CachedDirectory::new(
        PgPortfolioDirectory::new(reference_pool.clone()),
    ));
    let prepared = prepare_rows(source, directory, &config.processing).await;
    reference_pool.close().await;
    let prepared = prepared?;

    let upsert = if options.dry_run {
        info!("Dry run: skipping destination upsert");
        None
    } else {
        Some(write_destination(config, &prepared.rows).await?)
    };

    let timestamp = Local::now().naive_local();
    let directory = &config.paths.output_directory;
    std::fs::create_dir_all(directory)?;

    let snapshot = snapshot::snapshot_path(directory, SNAPSHOT_PREFIX, timestamp);
    snapshot::export(&prepared.rows, &snapshot)?;

    let successors: Vec<HandoverRow> = prepared.successors().cloned().collect();
    let currently_working_snapshot = snapshot::snapshot_path(directory, CURRENTLY_WORKING_PREFIX, timestamp);
    snapshot::export(&successors, &currently_working_snapshot)?;

    Ok(RunReport {
        source_rows,
        submitted_rows: prepared.submitted(),
        successor_rows: successors.len(),
        unresolved: prepared.unresolved,
        live_index_violations,
        upsert,
        snapshot,
        currently_working_snapshot,
    })
}

async fn write_destination(config: &HandoverConfig, rows: &[HandoverRow]) -> Result<UpsertSummary> {
    let pool = db::connect(&config.destination_database_url()?, 1).await?;
    if config.destination.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let summary = upsert::write_rows(&pool, config.destination.key_schema, rows).await;
    pool.close().await;
    summary
}
