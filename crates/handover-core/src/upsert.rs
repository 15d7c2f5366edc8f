use serde::Serialize;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use sqlx::{Connection, PgConnection, Postgres, Transaction};
use tracing::{error, info};

use crate::config::KeySchema;
use crate::dates::format_date;
use crate::db::DbPool;
use crate::error::{HandoverError, Result};
use crate::types::HandoverRow;

/// Width of identifier-like columns.
pub const IDENTIFIER_WIDTH: usize = 50;
/// Width of name, email and link columns.
pub const TEXT_WIDTH: usize = 225;

const COMPOSITE_UPSERT: &str = r#"
    INSERT INTO handover_automation_final (
        portfolio_id,
        name,
        start_date,
        email,
        portfolio_name,
        end_date,
        iprp_number,
        handing_over_to,
        sharepoint_link,
        index_status,
        index_family,
        email_receiver,
        zoom_link,
        zoom_key
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT ON CONSTRAINT handover_automation_final_natural_key
    DO UPDATE SET
        email = EXCLUDED.email,
        portfolio_name = EXCLUDED.portfolio_name,
        end_date = EXCLUDED.end_date,
        iprp_number = EXCLUDED.iprp_number,
        handing_over_to = EXCLUDED.handing_over_to,
        sharepoint_link = EXCLUDED.sharepoint_link,
        index_status = EXCLUDED.index_status,
        index_family = EXCLUDED.index_family,
        email_receiver = EXCLUDED.email_receiver,
        zoom_link = EXCLUDED.zoom_link,
        zoom_key = EXCLUDED.zoom_key
    RETURNING (xmax = 0) AS inserted
"#;

const SEQUENTIAL_UPSERT: &str = r#"
    INSERT INTO handovers_final (
        row_index,
        portfolio_id,
        name,
        start_date,
        email,
        portfolio_name,
        end_date,
        iprp_number,
        handing_over_to,
        sharepoint_link,
        index_status,
        index_family,
        email_receiver,
        zoom_link,
        zoom_key
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (row_index)
    DO UPDATE SET
        portfolio_id = EXCLUDED.portfolio_id,
        name = EXCLUDED.name,
        start_date = EXCLUDED.start_date,
        email = EXCLUDED.email,
        portfolio_name = EXCLUDED.portfolio_name,
        end_date = EXCLUDED.end_date,
        iprp_number = EXCLUDED.iprp_number,
        handing_over_to = EXCLUDED.handing_over_to,
        sharepoint_link = EXCLUDED.sharepoint_link,
        index_status = EXCLUDED.index_status,
        index_family = EXCLUDED.index_family,
        email_receiver = EXCLUDED.email_receiver,
        zoom_link = EXCLUDED.zoom_link,
        zoom_key = EXCLUDED.zoom_key
    RETURNING (xmax = 0) AS inserted
"#;

type MergeQuery<'q> = QueryScalar<'q, Postgres, bool, PgArguments>;

/// A handover row shaped for the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRecord {
    /// 1-based position in the run output; only bound under the sequential key.
    pub row_index: i32,
    pub portfolio_id: String,
    pub name: String,
    pub start_date: Option<String>,
    pub email: Option<String>,
    pub portfolio_name: Option<String>,
    pub end_date: Option<String>,
    pub iprp_number: Option<String>,
    pub handing_over_to: Option<String>,
    pub sharepoint_link: Option<String>,
    pub index_status: Option<String>,
    pub index_family: Option<String>,
    pub email_receiver: Option<String>,
    pub zoom_link: Option<String>,
    pub zoom_key: Option<String>,
}

impl DestinationRecord {
    pub fn from_row(row: &HandoverRow, row_index: usize) -> Result<Self> {
        let row_index = i32::try_from(row_index).map_err(|_| {
            HandoverError::Coercion(format!("row index {row_index} does not fit the row_index column"))
        })?;
        let details = &row.details;

        Ok(Self {
            row_index,
            portfolio_id: truncate(&row.portfolio_id(), IDENTIFIER_WIDTH),
            name: truncate(details.name.as_deref().unwrap_or_default(), TEXT_WIDTH),
            start_date: format_date(details.start_date),
            email: bounded(details.email.as_deref(), TEXT_WIDTH),
            portfolio_name: bounded(row.portfolio_name.as_deref(), TEXT_WIDTH),
            end_date: format_date(details.end_date),
            iprp_number: details.iprp_number.clone(),
            handing_over_to: bounded(details.handing_over_to.as_deref(), IDENTIFIER_WIDTH),
            sharepoint_link: bounded(details.sharepoint_link.as_deref(), TEXT_WIDTH),
            index_status: details.index_status.clone(),
            index_family: details.index_family.clone(),
            email_receiver: bounded(details.email_receiver.as_deref(), TEXT_WIDTH),
            zoom_link: bounded(details.zoom_link.as_deref(), TEXT_WIDTH),
            zoom_key: bounded(details.zoom_key.as_deref(), TEXT_WIDTH),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub successful: usize,
    pub failed: usize,
    pub inserted: usize,
    pub updated: usize,
}

/// Merges handover rows into the destination table chosen by its key schema.
#[derive(Debug, Clone, Copy)]
pub struct UpsertWriter {
    schema: KeySchema,
}

impl UpsertWriter {
    pub fn new(schema: KeySchema) -> Self {
        Self { schema }
    }

    /// Upserts every row inside `tx`, each under its own savepoint. A row
    /// that cannot be converted or merged is logged, counted and rolled back
    /// without disturbing the rest of the batch. Committing `tx` is left to
    /// the caller.
    pub async fn upsert(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[HandoverRow],
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();

        for (position, row) in rows.iter().enumerate() {
            let row_number = position + 1;
            let record = match DestinationRecord::from_row(row, row_number) {
                Ok(record) => record,
                Err(err) => {
                    error!(row = row_number, portfolio_id = %row.portfolio, error = %err, "Error upserting row");
                    summary.failed += 1;
                    continue;
                }
            };

            let mut savepoint = tx.begin().await?;
            match self.merge(&mut savepoint, &record).await {
                Ok(inserted) => {
                    savepoint.commit().await?;
                    summary.successful += 1;
                    if inserted {
                        summary.inserted += 1;
                    } else {
                        summary.updated += 1;
                    }
                }
                Err(err) => {
                    error!(row = row_number, portfolio_id = %record.portfolio_id, error = %err, "Error upserting row");
                    savepoint.rollback().await?;
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// Returns `true` when the row was inserted, `false` when it updated an
    /// existing one.
    async fn merge(&self, conn: &mut PgConnection, record: &DestinationRecord) -> Result<bool> {
        let query = match self.schema {
            KeySchema::Composite => bind_columns(sqlx::query_scalar::<Postgres, bool>(COMPOSITE_UPSERT), record),
            KeySchema::Sequential => bind_columns(
                sqlx::query_scalar::<Postgres, bool>(SEQUENTIAL_UPSERT).bind(record.row_index),
                record,
            ),
        };
        Ok(query.fetch_one(&mut *conn).await?)
    }
}

/// Upserts `rows` in one transaction and commits it.
pub async fn write_rows(pool: &DbPool, schema: KeySchema, rows: &[HandoverRow]) -> Result<UpsertSummary> {
    let mut tx = pool.begin().await?;
    let summary = UpsertWriter::new(schema).upsert(&mut tx, rows).await?;
    tx.commit().await?;

    info!(
        successful = summary.successful,
        failed = summary.failed,
        inserted = summary.inserted,
        updated = summary.updated,
        ?schema,
        "Upsert finished"
    );
    Ok(summary)
}

fn bind_columns<'q>(query: MergeQuery<'q>, record: &'q DestinationRecord) -> MergeQuery<'q> {
    query
        .bind(&record.portfolio_id)
        .bind(&record.name)
        .bind(&record.start_date)
        .bind(&record.email)
        .bind(&record.portfolio_name)
        .bind(&record.end_date)
        .bind(&record.iprp_number)
        .bind(&record.handing_over_to)
        .bind(&record.sharepoint_link)
        .bind(&record.index_status)
        .bind(&record.index_family)
        .bind(&record.email_receiver)
        .bind(&record.zoom_link)
        .bind(&record.zoom_key)
}

fn truncate(value: &str, width: usize) -> String {
    value.chars().take(width).collect()
}

fn bounded(value: Option<&str>, width: usize) -> Option<String> {
    value.map(|v| truncate(v, width))
}
