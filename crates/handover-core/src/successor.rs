use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, info};

use crate::dates::{is_open_ended, open_ended};
use crate::types::{HandoverRow, PortfolioKey, RowOrigin, CURRENTLY_WORKING};

/// Maps each handover recipient to the email address given for them; later
/// rows overwrite earlier ones.
pub fn receiver_emails(rows: &[HandoverRow]) -> HashMap<String, String> {
    let mut emails = HashMap::new();
    for row in rows {
        if let (Some(receiver), Some(email)) = (
            row.details.handing_over_to.as_deref(),
            row.details.email_receiver.as_deref(),
        ) {
            emails.insert(receiver.to_string(), email.to_string());
        }
    }
    emails
}

/// Picks the most recent handover of every portfolio and, where it names
/// who takes over and when it ends, derives the "currently working" row for
/// that person. Portfolios are visited in first-seen order; rows without
/// any portfolio identifier never chain.
pub fn synthesize_successors(rows: &[HandoverRow]) -> Vec<HandoverRow> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, &HandoverRow> = HashMap::new();

    for row in rows.iter().filter(|r| r.portfolio != PortfolioKey::Missing) {
        match latest.entry(row.portfolio_id()) {
            Entry::Vacant(slot) => {
                order.push(slot.key().clone());
                slot.insert(row);
            }
            Entry::Occupied(mut slot) => {
                if supersedes(row, slot.get()) {
                    slot.insert(row);
                }
            }
        }
    }

    let emails = receiver_emails(rows);
    let successors: Vec<HandoverRow> = order
        .iter()
        .filter_map(|key| latest.get(key))
        .filter_map(|row| successor_of(row, &emails))
        .collect();

    info!(portfolios = order.len(), successors = successors.len(), "Derived currently working rows");
    successors
}

/// Originals followed by their successors.
pub fn with_successors(rows: Vec<HandoverRow>) -> Vec<HandoverRow> {
    let successors = synthesize_successors(&rows);
    let mut combined = rows;
    combined.extend(successors);
    combined
}

/// Later start dates win; equal start dates fall back to the later source row.
fn supersedes(candidate: &HandoverRow, current: &HandoverRow) -> bool {
    (candidate.details.start_date, candidate.sequence) >= (current.details.start_date, current.sequence)
}

fn successor_of(row: &HandoverRow, emails: &HashMap<String, String>) -> Option<HandoverRow> {
    let receiver = row.details.handing_over_to.as_deref()?;
    if receiver == CURRENTLY_WORKING {
        return None;
    }

    let end_date = row.details.end_date?;
    if is_open_ended(end_date) {
        return None;
    }
    let Some(start_date) = end_date.succ_opt() else {
        debug!(portfolio_id = %row.portfolio, "End date has no following day; skipping successor");
        return None;
    };

    let mut details = row.details.clone();
    details.name = Some(receiver.to_string());
    details.email = emails.get(receiver).cloned();
    details.start_date = Some(start_date);
    details.end_date = Some(open_ended());
    details.handing_over_to = Some(CURRENTLY_WORKING.to_string());
    details.email_receiver = None;
    details.zoom_link = None;
    details.zoom_key = None;

    Some(HandoverRow {
        sequence: row.sequence,
        origin: RowOrigin::Successor,
        portfolio: row.portfolio.clone(),
        portfolio_name: row.portfolio_name.clone(),
        details,
    })
}
