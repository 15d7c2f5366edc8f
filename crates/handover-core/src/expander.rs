//! Expands form responses into one row per portfolio.
//!
//! Expansion runs in two phases. [`resolve_row`] looks identifiers up and is
//! free of run state, so chunks of the input can be resolved concurrently.
//! [`RunState::assign`] then walks the merged results in source order and
//! hands out the `Research_<n>` / `WrongID_<n>` placeholders from a single
//! counter per run, which keeps numbering identical for any worker count.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::UnresolvedPolicy;
use crate::error::{HandoverError, Result};
use crate::resolver::PortfolioDirectory;
use crate::types::{HandoverRow, PortfolioKey, RowOrigin, SourceRow};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Verified { id: String, name: String },
    Research,
    /// `listed` is set when the identifier came from the multi-identifier field.
    Unresolved { id: String, listed: bool },
    Missing,
}

/// A source row bound to the outcome of one identifier lookup.
#[derive(Debug, Clone)]
pub struct PendingRow {
    pub source: SourceRow,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedIdentifier {
    pub sequence: usize,
    pub portfolio_id: String,
}

/// Resolves every identifier a response refers to.
pub async fn resolve_row(
    row: &SourceRow,
    directory: &dyn PortfolioDirectory,
) -> Result<Vec<PendingRow>> {
    let listed = row.listed_portfolio_ids();
    if !listed.is_empty() {
        let mut pending = Vec::with_capacity(listed.len());
        for id in listed {
            let resolution = match directory.portfolio_name(id).await? {
                Some(name) => {
                    info!(sequence = row.sequence, portfolio_id = id, portfolio_name = %name, "Added row for listed portfolio");
                    Resolution::Verified {
                        id: id.to_string(),
                        name,
                    }
                }
                None => {
                    warn!(sequence = row.sequence, portfolio_id = id, "Portfolio ID not found in reference table");
                    Resolution::Unresolved {
                        id: id.to_string(),
                        listed: true,
                    }
                }
            };
            pending.push(PendingRow {
                source: row.clone(),
                resolution,
            });
        }
        return Ok(pending);
    }

    let resolution = if row.is_under_research() {
        Resolution::Research
    } else if let Some(id) = row.portfolio_id.as_deref() {
        match directory.portfolio_name(id).await? {
            Some(name) => Resolution::Verified {
                id: id.to_string(),
                name,
            },
            None => {
                warn!(sequence = row.sequence, portfolio_id = id, "Portfolio ID not found in reference table");
                Resolution::Unresolved {
                    id: id.to_string(),
                    listed: false,
                }
            }
        }
    } else {
        warn!(sequence = row.sequence, "Empty Portfolio ID; passing the row through");
        Resolution::Missing
    };

    Ok(vec![PendingRow {
        source: row.clone(),
        resolution,
    }])
}

/// Placeholder counters and the unresolved-identifier list of one run.
#[derive(Debug)]
pub struct RunState {
    next_research: u32,
    next_wrong_id: u32,
    unresolved: Vec<UnresolvedIdentifier>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            next_research: 1,
            next_wrong_id: 1,
            unresolved: Vec::new(),
        }
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number the next `Research_<n>` placeholder will get.
    pub fn next_research_number(&self) -> u32 {
        self.next_research
    }

    pub fn next_wrong_id_number(&self) -> u32 {
        self.next_wrong_id
    }

    pub fn unresolved(&self) -> &[UnresolvedIdentifier] {
        &self.unresolved
    }

    pub fn into_unresolved(self) -> Vec<UnresolvedIdentifier> {
        self.unresolved
    }

    /// Turns resolved rows into handover rows. `pending` must be in source
    /// order for placeholder numbering to follow the input file.
    pub fn assign(&mut self, pending: Vec<PendingRow>, policy: UnresolvedPolicy) -> Vec<HandoverRow> {
        let mut rows = Vec::with_capacity(pending.len());

        for PendingRow { source, resolution } in pending {
            let (portfolio, portfolio_name) = match resolution {
                Resolution::Verified { id, name } => (PortfolioKey::Verified(id), Some(name)),
                Resolution::Research => {
                    let key = PortfolioKey::Research(self.take_research());
                    info!(sequence = source.sequence, portfolio_id = %key, "Added Under Research row");
                    let name = source
                        .project_name
                        .clone()
                        .or_else(|| source.portfolio_name.clone());
                    (key, name)
                }
                Resolution::Missing => (PortfolioKey::Missing, source.portfolio_name.clone()),
                Resolution::Unresolved { id, listed } => {
                    self.unresolved.push(UnresolvedIdentifier {
                        sequence: source.sequence,
                        portfolio_id: id.clone(),
                    });
                    match (policy, listed) {
                        (UnresolvedPolicy::Placeholder, _) => {
                            let key = PortfolioKey::WrongId(self.take_wrong_id());
                            warn!(sequence = source.sequence, portfolio_id = %id, placeholder = %key, "Using placeholder for unknown Portfolio ID");
                            (key, source.portfolio_name.clone())
                        }
                        (_, true) => continue,
                        (_, false) => (PortfolioKey::Unverified(id), source.portfolio_name.clone()),
                    }
                }
            };

            rows.push(HandoverRow {
                sequence: source.sequence,
                origin: RowOrigin::Submitted,
                portfolio,
                portfolio_name,
                details: source.details,
            });
        }

        rows
    }

    fn take_research(&mut self) -> u32 {
        let n = self.next_research;
        self.next_research += 1;
        n
    }

    fn take_wrong_id(&mut self) -> u32 {
        let n = self.next_wrong_id;
        self.next_wrong_id += 1;
        n
    }
}

#[derive(Debug)]
pub struct ExpansionOutcome {
    pub rows: Vec<HandoverRow>,
    pub unresolved: Vec<UnresolvedIdentifier>,
}

impl ExpansionOutcome {
    /// Applies the unresolved-identifier policy: under `fail-fast` any
    /// unresolved identifier aborts the run.
    pub fn enforce(self, policy: UnresolvedPolicy) -> Result<Vec<HandoverRow>> {
        if self.unresolved.is_empty() {
            return Ok(self.rows);
        }

        if policy == UnresolvedPolicy::FailFast {
            error!(count = self.unresolved.len(), "The following portfolio IDs were not found");
            for entry in &self.unresolved {
                error!(sequence = entry.sequence, portfolio_id = %entry.portfolio_id, "Unresolved portfolio ID");
            }
            return Err(HandoverError::UnresolvedPortfolios(
                self.unresolved.into_iter().map(|u| u.portfolio_id).collect(),
            ));
        }

        warn!(count = self.unresolved.len(), ?policy, "Continuing with unresolved portfolio IDs");
        Ok(self.rows)
    }
}

/// Expands all rows on the current task.
pub async fn expand_rows(
    rows: &[SourceRow],
    directory: &dyn PortfolioDirectory,
    policy: UnresolvedPolicy,
) -> Result<ExpansionOutcome> {
    let mut pending = Vec::with_capacity(rows.len());
    for row in rows {
        pending.extend(resolve_row(row, directory).await?);
    }
    Ok(finish(pending, policy))
}

/// Resolves contiguous chunks of the input on `workers` tasks, then restores
/// source order before numbering placeholders.
pub async fn expand_rows_parallel(
    rows: Vec<SourceRow>,
    directory: Arc<dyn PortfolioDirectory>,
    workers: usize,
    policy: UnresolvedPolicy,
) -> Result<ExpansionOutcome> {
    if workers <= 1 || rows.len() < 2 {
        return expand_rows(&rows, directory.as_ref(), policy).await;
    }

    let chunk_size = rows.len().div_ceil(workers);
    let mut tasks = JoinSet::new();
    for (index, chunk) in rows.chunks(chunk_size).enumerate() {
        let chunk = chunk.to_vec();
        let directory = Arc::clone(&directory);
        tasks.spawn(async move {
            let mut pending = Vec::with_capacity(chunk.len());
            for row in &chunk {
                pending.extend(resolve_row(row, directory.as_ref()).await?);
            }
            Ok::<_, HandoverError>((index, pending))
        });
    }
    info!(workers, chunk_size, "Resolving portfolio IDs in parallel");

    let mut chunks = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        chunks.push(joined??);
    }
    chunks.sort_by_key(|(index, _)| *index);

    let pending = chunks.into_iter().flat_map(|(_, pending)| pending).collect();
    Ok(finish(pending, policy))
}

fn finish(pending: Vec<PendingRow>, policy: UnresolvedPolicy) -> ExpansionOutcome {
    let mut state = RunState::new();
    let rows = state.assign(pending, policy);
    ExpansionOutcome {
        rows,
        unresolved: state.into_unresolved(),
    }
}
