use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use handover_core::config::UnresolvedPolicy;
use handover_core::error::{HandoverError, Result};
use handover_core::expander::{expand_rows, expand_rows_parallel, resolve_row, Resolution};
use handover_core::resolver::{CachedDirectory, PortfolioDirectory, StaticPortfolioDirectory};
use handover_core::types::{HandoverDetails, PortfolioKey, SourceRow, UNDER_RESEARCH};

fn directory() -> StaticPortfolioDirectory {
    StaticPortfolioDirectory::new([("101", "Fund Alpha TR"), ("103", "Fund Gamma")])
}

fn listed(sequence: usize, list: &str) -> SourceRow {
    SourceRow {
        sequence,
        portfolio_id_list: Some(list.into()),
        details: HandoverDetails {
            name: Some("Ana".into()),
            index_status: Some("Live Index".into()),
            ..HandoverDetails::default()
        },
        ..SourceRow::default()
    }
}

fn single(sequence: usize, id: &str) -> SourceRow {
    SourceRow {
        sequence,
        portfolio_id: Some(id.into()),
        portfolio_name: Some("Typed Name".into()),
        details: HandoverDetails {
            name: Some("Bo".into()),
            index_status: Some("Live Index".into()),
            ..HandoverDetails::default()
        },
        ..SourceRow::default()
    }
}

fn research(sequence: usize, project: &str) -> SourceRow {
    SourceRow {
        sequence,
        project_name: Some(project.into()),
        details: HandoverDetails {
            name: Some("Cy".into()),
            index_status: Some(UNDER_RESEARCH.into()),
            ..HandoverDetails::default()
        },
        ..SourceRow::default()
    }
}

#[tokio::test]
async fn listed_identifiers_fail_fast_on_unknown() {
    let outcome = expand_rows(&[listed(0, "101, 102")], &directory(), UnresolvedPolicy::FailFast)
        .await
        .unwrap();

    assert_eq!(outcome.rows.len(), 1);
    assert_eq!(outcome.rows[0].portfolio, PortfolioKey::Verified("101".into()));
    assert_eq!(outcome.rows[0].portfolio_name.as_deref(), Some("Fund Alpha TR"));
    assert_eq!(outcome.unresolved.len(), 1);
    assert_eq!(outcome.unresolved[0].portfolio_id, "102");

    match outcome.enforce(UnresolvedPolicy::FailFast) {
        Err(HandoverError::UnresolvedPortfolios(ids)) => assert_eq!(ids, vec!["102".to_string()]),
        other => panic!("expected unresolved error, got {other:?}"),
    }
}

#[tokio::test]
async fn permissive_policy_drops_unknown_list_entries() {
    let rows = expand_rows(&[listed(0, "101, 102")], &directory(), UnresolvedPolicy::Permissive)
        .await
        .unwrap()
        .enforce(UnresolvedPolicy::Permissive)
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].portfolio_id(), "101");
}

#[tokio::test]
async fn placeholder_policy_numbers_unknown_identifiers() {
    let rows = expand_rows(
        &[listed(0, "101,102"), single(1, "999")],
        &directory(),
        UnresolvedPolicy::Placeholder,
    )
    .await
    .unwrap()
    .enforce(UnresolvedPolicy::Placeholder)
    .unwrap();

    let ids: Vec<String> = rows.iter().map(|r| r.portfolio_id()).collect();
    assert_eq!(ids, vec!["101", "WrongID_1", "WrongID_2"]);
    assert!(rows[1].portfolio.is_placeholder());
}

#[tokio::test]
async fn research_rows_get_sequential_placeholders() {
    let outcome = expand_rows(
        &[research(0, "New Thing"), single(1, "103"), research(2, "Other Thing")],
        &directory(),
        UnresolvedPolicy::FailFast,
    )
    .await
    .unwrap();

    let rows = outcome.enforce(UnresolvedPolicy::FailFast).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].portfolio_id(), "Research_1");
    assert_eq!(rows[0].portfolio_name.as_deref(), Some("New Thing"));
    assert_eq!(rows[1].portfolio_name.as_deref(), Some("Fund Gamma"));
    assert_eq!(rows[2].portfolio_id(), "Research_2");
}

#[tokio::test]
async fn single_identifier_yields_at_most_one_row() {
    let dir = directory();
    for row in [single(0, "103"), single(1, "999"), SourceRow::default()] {
        let pending = resolve_row(&row, &dir).await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    let missing = resolve_row(&SourceRow::default(), &dir).await.unwrap();
    assert_eq!(missing[0].resolution, Resolution::Missing);
}

#[tokio::test]
async fn permissive_policy_keeps_unknown_single_identifier() {
    let rows = expand_rows(&[single(0, "999")], &directory(), UnresolvedPolicy::Permissive)
        .await
        .unwrap()
        .enforce(UnresolvedPolicy::Permissive)
        .unwrap();

    assert_eq!(rows[0].portfolio, PortfolioKey::Unverified("999".into()));
    assert_eq!(rows[0].portfolio_name.as_deref(), Some("Typed Name"));
}

#[tokio::test]
async fn parallel_expansion_matches_sequential_numbering() {
    let source: Vec<SourceRow> = (0..40)
        .map(|i| match i % 4 {
            0 => research(i, "R"),
            1 => single(i, "999"),
            2 => listed(i, "101,103,555"),
            _ => single(i, "103"),
        })
        .collect();

    let sequential = expand_rows(&source, &directory(), UnresolvedPolicy::Placeholder)
        .await
        .unwrap();

    for workers in [2, 3, 8] {
        let shared: Arc<dyn PortfolioDirectory> = Arc::new(directory());
        let parallel = expand_rows_parallel(source.clone(), shared, workers, UnresolvedPolicy::Placeholder)
            .await
            .unwrap();
        assert_eq!(parallel.rows, sequential.rows, "workers = {workers}");
        assert_eq!(parallel.unresolved, sequential.unresolved);
    }
}

struct CountingDirectory {
    inner: StaticPortfolioDirectory,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PortfolioDirectory for CountingDirectory {
    async fn portfolio_name(&self, portfolio_id: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.portfolio_name(portfolio_id).await
    }
}

#[tokio::test]
async fn cached_directory_looks_each_identifier_up_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let cached = CachedDirectory::new(CountingDirectory {
        inner: directory(),
        calls: Arc::clone(&calls),
    });

    let first = expand_rows(&[listed(0, "101,102"), single(1, "101")], &cached, UnresolvedPolicy::Permissive)
        .await
        .unwrap();
    let second = expand_rows(&[listed(0, "101,102"), single(1, "101")], &cached, UnresolvedPolicy::Permissive)
        .await
        .unwrap();

    assert_eq!(first.rows, second.rows);
    assert_eq!(cached.cached_entries(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
