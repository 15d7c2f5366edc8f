// crates/handover-core/src/types.rs

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

/// Index status marking a portfolio that has no identifier yet.
pub const UNDER_RESEARCH: &str = "Under Research";

/// Index status marking a published portfolio.
pub const LIVE_INDEX: &str = "Live Index";

/// `handing_over_to` value carried by synthesized successor rows.
pub const CURRENTLY_WORKING: &str = "Currently working";

/// Fields of a handover that travel unchanged from the form response to
/// every row derived from it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HandoverDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub index_status: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub iprp_number: Option<String>,
    pub handing_over_to: Option<String>,
    pub sharepoint_link: Option<String>,
    pub index_family: Option<String>,
    pub email_receiver: Option<String>,
    pub zoom_link: Option<String>,
    pub zoom_key: Option<String>,
}

/// One form response as read from the CSV export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceRow {
    /// 0-based position of the record in the input file.
    pub sequence: usize,
    pub portfolio_id: Option<String>,
    pub portfolio_id_list: Option<String>,
    pub portfolio_name: Option<String>,
    pub project_name: Option<String>,
    pub details: HandoverDetails,
}

impl SourceRow {
    pub fn is_under_research(&self) -> bool {
        self.details.index_status.as_deref() == Some(UNDER_RESEARCH)
    }

    /// Tokens of the multi-identifier field, trimmed, empties dropped.
    pub fn listed_portfolio_ids(&self) -> Vec<&str> {
        self.portfolio_id_list
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// The portfolio a handover row is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PortfolioKey {
    /// Found in the reference table.
    Verified(String),
    /// `Research_<n>` placeholder for rows under research.
    Research(u32),
    /// `WrongID_<n>` placeholder for identifiers missing from the reference table.
    WrongId(u32),
    /// Submitted identifier kept as-is although it did not resolve.
    Unverified(String),
    /// The response carried no identifier at all.
    Missing,
}

impl PortfolioKey {
    pub fn as_id(&self) -> String {
        self.to_string()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, PortfolioKey::Research(_) | PortfolioKey::WrongId(_))
    }
}

impl fmt::Display for PortfolioKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortfolioKey::Verified(id) | PortfolioKey::Unverified(id) => f.write_str(id),
            PortfolioKey::Research(n) => write!(f, "Research_{n}"),
            PortfolioKey::WrongId(n) => write!(f, "WrongID_{n}"),
            PortfolioKey::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOrigin {
    Submitted,
    Successor,
}

/// A handover bound to exactly one portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoverRow {
    /// Sequence of the source row this was derived from.
    pub sequence: usize,
    pub origin: RowOrigin,
    pub portfolio: PortfolioKey,
    pub portfolio_name: Option<String>,
    pub details: HandoverDetails,
}

impl HandoverRow {
    pub fn portfolio_id(&self) -> String {
        self.portfolio.as_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_keys_render_with_counter() {
        assert_eq!(PortfolioKey::Research(1).as_id(), "Research_1");
        assert_eq!(PortfolioKey::WrongId(12).as_id(), "WrongID_12");
        assert_eq!(PortfolioKey::Verified("F0001".into()).as_id(), "F0001");
        assert_eq!(PortfolioKey::Missing.as_id(), "");
    }

    #[test]
    fn listed_ids_are_trimmed_and_empties_dropped() {
        let row = SourceRow {
            portfolio_id_list: Some(" 101, ,102 ,, 103".into()),
            ..SourceRow::default()
        };
        assert_eq!(row.listed_portfolio_ids(), vec!["101", "102", "103"]);

        let blank = SourceRow {
            portfolio_id_list: Some(" , ".into()),
            ..SourceRow::default()
        };
        assert!(blank.listed_portfolio_ids().is_empty());
    }
}
