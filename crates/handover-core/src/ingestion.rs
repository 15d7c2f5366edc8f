use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use csv::StringRecord;
use encoding_rs::WINDOWS_1252;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::dates::parse_date;
use crate::error::{HandoverError, Result};
use crate::types::{HandoverDetails, SourceRow, LIVE_INDEX};

/// Form bookkeeping columns that never reach the destination.
pub const DROPPED_COLUMNS: [&str; 4] = [
    "Start time",
    "Completion time",
    "Name (Person doing the Handover)",
    "Id",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Email,
    Name,
    PortfolioId,
    PortfolioIdList,
    PortfolioName,
    ProjectName,
    IndexStatus,
    StartDate,
    EndDate,
    IprpNumber,
    HandingOverTo,
    SharepointLink,
    IndexFamily,
    EmailReceiver,
    ZoomLink,
    ZoomKey,
}

impl Column {
    const ALL: [Column; 16] = [
        Column::Email,
        Column::Name,
        Column::PortfolioId,
        Column::PortfolioIdList,
        Column::PortfolioName,
        Column::ProjectName,
        Column::IndexStatus,
        Column::StartDate,
        Column::EndDate,
        Column::IprpNumber,
        Column::HandingOverTo,
        Column::SharepointLink,
        Column::IndexFamily,
        Column::EmailReceiver,
        Column::ZoomLink,
        Column::ZoomKey,
    ];

    /// Accepted header spellings; the first one is canonical.
    fn headers(self) -> &'static [&'static str] {
        match self {
            Column::Email => &["Email"],
            Column::Name => &["Name"],
            Column::PortfolioId => &["Portfolio ID"],
            Column::PortfolioIdList => &["Add all the Portfolio IDs [separated by \",\"(commas)]"],
            Column::PortfolioName => &["Portfolio Name"],
            Column::ProjectName => &["Portfolio/Project Name"],
            Column::IndexStatus => &["Index Status"],
            Column::StartDate => &["Start Date"],
            Column::EndDate => &["End Date"],
            Column::IprpNumber => &["IPRP Number", "IPRP Link"],
            Column::HandingOverTo => &["Handing Over to"],
            Column::SharepointLink => &["Handover files Sharepoint link"],
            Column::IndexFamily => &["Is it a part of Index Family"],
            Column::EmailReceiver => &["Email (Person receiving the handover)"],
            Column::ZoomLink => &["Zoom recording link"],
            Column::ZoomKey => &["Zoom recording key"],
        }
    }

    fn is_required(self) -> bool {
        matches!(
            self,
            Column::PortfolioId
                | Column::IndexStatus
                | Column::StartDate
                | Column::EndDate
                | Column::Name
        )
    }
}

struct ColumnMap {
    indices: HashMap<Column, usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let dropped: Vec<String> = DROPPED_COLUMNS.iter().map(|h| normalize_header(h)).collect();

        let mut indices = HashMap::new();
        for column in Column::ALL {
            let wanted: Vec<String> = column.headers().iter().map(|h| normalize_header(h)).collect();
            if let Some(index) = normalized.iter().position(|h| wanted.contains(h)) {
                indices.insert(column, index);
            } else if column.is_required() {
                return Err(HandoverError::MissingColumn(column.headers()[0].to_string()));
            }
        }

        for (index, header) in normalized.iter().enumerate() {
            if dropped.contains(header) {
                debug!(column = %headers.get(index).unwrap_or_default(), "Dropping form bookkeeping column");
            } else if !indices.values().any(|&i| i == index) {
                debug!(column = %headers.get(index).unwrap_or_default(), "Ignoring unrecognised column");
            }
        }

        Ok(Self { indices })
    }

    fn cell(&self, record: &StringRecord, column: Column) -> Option<String> {
        let index = *self.indices.get(&column)?;
        record
            .get(index)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }
}

pub fn read_source_file(path: &Path) -> Result<Vec<SourceRow>> {
    let bytes = std::fs::read(path)?;
    let rows = read_source_rows(&bytes)?;
    info!(path = %path.display(), rows = rows.len(), "Read form responses");
    Ok(rows)
}

/// Parses a form export into source rows, in file order.
pub fn read_source_rows(bytes: &[u8]) -> Result<Vec<SourceRow>> {
    let text = decode_text(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers)?;

    let mut rows = Vec::new();
    for (sequence, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            debug!(sequence, "Skipping blank line");
            continue;
        }
        rows.push(build_row(sequence, &record, &columns));
    }

    Ok(rows)
}

fn build_row(sequence: usize, record: &StringRecord, columns: &ColumnMap) -> SourceRow {
    let date = |column: Column, label: &str| {
        let raw = columns.cell(record, column)?;
        let parsed = parse_date(&raw);
        if parsed.is_none() {
            warn!(sequence, column = label, value = %raw, "Unparsable date; leaving it blank");
        }
        parsed
    };

    SourceRow {
        sequence,
        portfolio_id: columns.cell(record, Column::PortfolioId),
        portfolio_id_list: columns.cell(record, Column::PortfolioIdList),
        portfolio_name: columns.cell(record, Column::PortfolioName),
        project_name: columns.cell(record, Column::ProjectName),
        details: HandoverDetails {
            name: columns.cell(record, Column::Name),
            email: columns.cell(record, Column::Email),
            index_status: columns.cell(record, Column::IndexStatus),
            start_date: date(Column::StartDate, "Start Date"),
            end_date: date(Column::EndDate, "End Date"),
            iprp_number: columns.cell(record, Column::IprpNumber),
            handing_over_to: columns.cell(record, Column::HandingOverTo),
            sharepoint_link: columns.cell(record, Column::SharepointLink),
            index_family: columns.cell(record, Column::IndexFamily),
            email_receiver: columns.cell(record, Column::EmailReceiver),
            zoom_link: columns.cell(record, Column::ZoomLink),
            zoom_key: columns.cell(record, Column::ZoomKey),
        },
    }
}

/// Decodes the export as UTF-8 when it is valid UTF-8 and as latin1
/// (windows-1252) otherwise. A UTF-8 BOM is dropped.
pub fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let (decoded, _, _) = WINDOWS_1252.decode(bytes);
    decoded.into_owned()
}

/// Folds the spelling differences form exports pick up along the way:
/// UTF-8 non-breaking spaces read as latin1 (`Â` + NBSP), bare NBSPs, runs of
/// whitespace and letter case.
pub fn normalize_header(header: &str) -> String {
    header
        .replace("\u{00C2}\u{00A0}", " ")
        .replace('\u{00A0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveIndexIssue {
    /// Neither `Portfolio ID` nor the identifier list is filled.
    BothEmpty,
    /// `Portfolio ID` and the identifier list are both filled.
    BothFilled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveIndexViolation {
    pub sequence: usize,
    pub issue: LiveIndexIssue,
}

impl fmt::Display for LiveIndexViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.issue {
            LiveIndexIssue::BothEmpty => write!(f, "row {} has no portfolio identifier", self.sequence),
            LiveIndexIssue::BothFilled => write!(
                f,
                "row {} fills both 'Portfolio ID' and the identifier list",
                self.sequence
            ),
        }
    }
}

/// Live indices must name their portfolios in exactly one of the two
/// identifier fields.
pub fn check_live_index_identifiers(rows: &[SourceRow]) -> Vec<LiveIndexViolation> {
    rows.iter()
        .filter(|row| row.details.index_status.as_deref() == Some(LIVE_INDEX))
        .filter_map(|row| {
            let single = row.portfolio_id.is_some();
            let list = row.portfolio_id_list.is_some();
            let issue = match (single, list) {
                (false, false) => LiveIndexIssue::BothEmpty,
                (true, true) => LiveIndexIssue::BothFilled,
                _ => return None,
            };
            Some(LiveIndexViolation {
                sequence: row.sequence,
                issue,
            })
        })
        .collect()
}
