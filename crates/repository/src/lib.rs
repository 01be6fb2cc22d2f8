//! # Ledger repository
//!
//! Append-only audit rows for order sessions: one row per transition of
//! interest (payment link issued, payment captured, COD order placed).
//! Backends: a spreadsheet, a Postgres table, or the log.
//!
//! Writes are fire-and-forget from the caller's point of view: the service
//! queues rows for a background writer that logs a failed append and carries on.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Pool, PoolError};
use model::LedgerRow;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

/// Error types that can occur while appending a ledger row.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// Failed to obtain a database connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// The spreadsheet API could not be reached.
    #[error("Spreadsheet transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// The spreadsheet API answered with a non-success status.
    #[error("Spreadsheet rejected append ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// # LedgerRepository
///
/// Sink for audit rows. Implementations must never reorder or rewrite rows.
#[async_trait]
pub trait LedgerRepository: Send + Sync + 'static {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError>;
}

#[async_trait]
impl<T: LedgerRepository + ?Sized> LedgerRepository for Arc<T> {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        (**self).append_row(row).await
    }
}

/// Google Sheets `values:append` backend.
pub struct SheetsLedgerRepository {
    http: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    range: String,
    access_token: String,
}

impl SheetsLedgerRepository {
    pub fn new(
        http: reqwest::Client,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        range: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            http,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            range: range.into(),
            access_token: access_token.into(),
        }
    }

    fn append_url(&self) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}:append",
            self.api_base.trim_end_matches('/'),
            self.spreadsheet_id,
            self.range
        )
    }
}

#[async_trait]
impl LedgerRepository for SheetsLedgerRepository {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        let response = self
            .http
            .post(self.append_url())
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "USER_ENTERED"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "values": [row.values()] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RepositoryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        debug!(
            order_id = %row.order_id,
            status = row.status.as_str(),
            "ledger row appended to sheet"
        );
        Ok(())
    }
}

/// PostgreSQL backend writing into the `ledger_rows` table.
pub struct PgLedgerRepository {
    pool: Pool,
}

impl PgLedgerRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO ledger_rows (
                recorded_at, order_id, phone, status, customer_name, address, pincode, email,
                items, payment_mode, amount, shipping_charge, shipping_quote, payment_ref,
                carrier_ref, shipment_response
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
        "#;
        let client = self.pool.get().await?;
        client
            .execute(
                query,
                &[
                    &row.recorded_at,
                    &row.order_id,
                    &row.phone,
                    &row.status.as_str(),
                    &row.customer_name,
                    &row.address,
                    &row.pincode,
                    &row.email,
                    &row.items,
                    &row.payment_mode,
                    &row.amount,
                    &row.shipping_charge,
                    &row.shipping_quote,
                    &row.payment_ref,
                    &row.carrier_ref,
                    &row.shipment_response,
                ],
            )
            .await?;
        Ok(())
    }
}

/// Writes rows to the log only. Useful for local runs without a sheet or database.
#[derive(Debug, Default)]
pub struct LogLedgerRepository;

#[async_trait]
impl LedgerRepository for LogLedgerRepository {
    async fn append_row(&self, row: &LedgerRow) -> Result<(), RepositoryError> {
        info!(
            order_id = %row.order_id,
            phone = %row.phone,
            status = row.status.as_str(),
            values = ?row.values(),
            "ledger row"
        );
        Ok(())
    }
}
