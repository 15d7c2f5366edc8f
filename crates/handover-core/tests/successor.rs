use chrono::NaiveDate;
use handover_core::dates::open_ended;
use handover_core::successor::{receiver_emails, synthesize_successors, with_successors};
use handover_core::types::{HandoverDetails, HandoverRow, PortfolioKey, RowOrigin, CURRENTLY_WORKING};

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

fn handover(sequence: usize, id: &str, start: Option<NaiveDate>, end: Option<NaiveDate>, to: Option<&str>) -> HandoverRow {
    HandoverRow {
        sequence,
        origin: RowOrigin::Submitted,
        portfolio: PortfolioKey::Verified(id.into()),
        portfolio_name: Some("Fund X".into()),
        details: HandoverDetails {
            name: Some(format!("Owner {sequence}")),
            email: Some(format!("owner{sequence}@example.com")),
            start_date: start,
            end_date: end,
            handing_over_to: to.map(str::to_string),
            sharepoint_link: Some("https://sp/x".into()),
            email_receiver: to.map(|t| format!("{}@example.com", t.to_lowercase())),
            zoom_link: Some("https://zoom/x".into()),
            zoom_key: Some("key".into()),
            ..HandoverDetails::default()
        },
    }
}

#[test]
fn latest_handover_gets_one_successor() {
    let rows = vec![
        handover(0, "X", date(2023, 1, 1), date(2023, 5, 31), Some("Bo")),
        handover(1, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Jane")),
    ];

    let successors = synthesize_successors(&rows);
    assert_eq!(successors.len(), 1);

    let jane = &successors[0];
    assert_eq!(jane.origin, RowOrigin::Successor);
    assert_eq!(jane.portfolio_id(), "X");
    assert_eq!(jane.details.name.as_deref(), Some("Jane"));
    assert_eq!(jane.details.email.as_deref(), Some("jane@example.com"));
    assert_eq!(jane.details.start_date, date(2024, 1, 1));
    assert_eq!(jane.details.end_date, Some(open_ended()));
    assert_eq!(jane.details.handing_over_to.as_deref(), Some(CURRENTLY_WORKING));
    assert_eq!(jane.details.email_receiver, None);
    assert_eq!(jane.details.zoom_link, None);
    assert_eq!(jane.details.zoom_key, None);
    assert_eq!(jane.details.sharepoint_link.as_deref(), Some("https://sp/x"));
}

#[test]
fn originals_come_first() {
    let rows = vec![
        handover(0, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Jane")),
        handover(1, "Y", date(2023, 2, 1), date(2023, 3, 31), Some("Bo")),
    ];

    let combined = with_successors(rows.clone());
    assert_eq!(combined.len(), 4);
    assert_eq!(&combined[..2], &rows[..]);
    assert_eq!(combined[2].portfolio_id(), "X");
    assert_eq!(combined[3].portfolio_id(), "Y");
}

#[test]
fn equal_start_dates_prefer_the_later_row() {
    let rows = vec![
        handover(0, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Bo")),
        handover(1, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Jane")),
    ];

    let successors = synthesize_successors(&rows);
    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].details.name.as_deref(), Some("Jane"));
}

#[test]
fn no_successor_without_end_date_or_receiver() {
    let rows = vec![
        handover(0, "X", date(2023, 6, 1), None, Some("Jane")),
        handover(1, "Y", date(2023, 6, 1), date(2023, 12, 31), None),
        handover(2, "Z", date(2023, 6, 1), Some(open_ended()), Some("Jane")),
        handover(3, "W", date(2023, 6, 1), date(2023, 12, 31), Some(CURRENTLY_WORKING)),
    ];

    assert!(synthesize_successors(&rows).is_empty());
}

#[test]
fn rows_without_identifier_never_chain() {
    let mut row = handover(0, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Jane"));
    row.portfolio = PortfolioKey::Missing;
    assert!(synthesize_successors(&[row]).is_empty());
}

#[test]
fn receiver_email_last_writer_wins() {
    let mut first = handover(0, "X", date(2023, 1, 1), date(2023, 1, 31), Some("Jane"));
    first.details.email_receiver = Some("old@example.com".into());
    let mut second = handover(1, "Y", date(2023, 1, 1), date(2023, 1, 31), Some("Jane"));
    second.details.email_receiver = Some("new@example.com".into());

    let emails = receiver_emails(&[first.clone(), second.clone()]);
    assert_eq!(emails.get("Jane").map(String::as_str), Some("new@example.com"));

    let successors = synthesize_successors(&[first, second]);
    assert!(successors
        .iter()
        .all(|s| s.details.email.as_deref() == Some("new@example.com")));
}

#[test]
fn derived_rows_do_not_chain_again() {
    let rows = with_successors(vec![handover(0, "X", date(2023, 6, 1), date(2023, 12, 31), Some("Jane"))]);
    let again = synthesize_successors(&rows);
    assert!(again.is_empty());
}
