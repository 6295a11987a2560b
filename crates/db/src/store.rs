//! SQLite-backed quote store.
//!
//! The conditional transition maps to a single `UPDATE ... WHERE id = ? AND
//! status IN (...)`; SQLite serializes writers, so `rows_affected` tells the
//! caller whether it won or lost the race.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use printshop_core::domain::customer::CustomerRef;
use printshop_core::domain::quote::{DeliveryMetadata, Quote, QuoteId, QuoteLine, QuoteStatus};
use printshop_core::gateway::{DeliveryEvent, DeliveryEventType};
use printshop_core::store::{QuoteStore, StatusPatch, StoreError, TransitionOutcome};

use crate::DbPool;

pub struct SqlQuoteStore {
    pool: DbPool,
}

impl SqlQuoteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        let Some(row) = sqlx::query("SELECT * FROM quote WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        else {
            return Ok(None);
        };

        let lines = sqlx::query(
            "SELECT description, quantity, unit_price
             FROM quote_line WHERE quote_id = ? ORDER BY line_index",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(line_from_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(quote_from_row(&row, lines)?))
    }
}

#[async_trait]
impl QuoteStore for SqlQuoteStore {
    async fn create(&self, quote: Quote) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let inserted = sqlx::query(
            "INSERT INTO quote (
                id, customer_name, customer_email, status, created_at,
                sent_at, reminder_sent_at, approved_at, rejected_at, expired_at,
                rejection_reason, delivery_message_id,
                delivered_at, opened_at, clicked_at, bounced_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&quote.id.0)
        .bind(&quote.customer.name)
        .bind(&quote.customer.email)
        .bind(quote.status.as_key())
        .bind(fmt_ts(quote.created_at))
        .bind(quote.sent_at.map(fmt_ts))
        .bind(quote.reminder_sent_at.map(fmt_ts))
        .bind(quote.approved_at.map(fmt_ts))
        .bind(quote.rejected_at.map(fmt_ts))
        .bind(quote.expired_at.map(fmt_ts))
        .bind(&quote.rejection_reason)
        .bind(&quote.delivery.message_id)
        .bind(quote.delivery.delivered_at.map(fmt_ts))
        .bind(quote.delivery.opened_at.map(fmt_ts))
        .bind(quote.delivery.clicked_at.map(fmt_ts))
        .bind(quote.delivery.bounced_at.map(fmt_ts))
        .execute(&mut *tx)
        .await;

        if let Err(error) = inserted {
            if let sqlx::Error::Database(db_error) = &error {
                if db_error.is_unique_violation() {
                    return Err(StoreError::AlreadyExists(quote.id));
                }
            }
            return Err(backend(error));
        }

        for (index, line) in quote.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO quote_line (quote_id, line_index, description, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&quote.id.0)
            .bind(index as i64)
            .bind(&line.description)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)
    }

    async fn find(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        self.fetch(id).await
    }

    async fn transition(
        &self,
        id: &QuoteId,
        accepted_from: &[QuoteStatus],
        status: QuoteStatus,
        patch: StatusPatch,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut builder = QueryBuilder::new("UPDATE quote SET status = ");
        builder.push_bind(status.as_key());
        if let Some(sent_at) = patch.sent_at {
            builder.push(", sent_at = ").push_bind(fmt_ts(sent_at));
        }
        if let Some(reminder_sent_at) = patch.reminder_sent_at {
            builder.push(", reminder_sent_at = ").push_bind(fmt_ts(reminder_sent_at));
        }
        if let Some(approved_at) = patch.approved_at {
            builder.push(", approved_at = ").push_bind(fmt_ts(approved_at));
        }
        if let Some(rejected_at) = patch.rejected_at {
            builder.push(", rejected_at = ").push_bind(fmt_ts(rejected_at));
        }
        if let Some(expired_at) = patch.expired_at {
            builder.push(", expired_at = ").push_bind(fmt_ts(expired_at));
        }
        if let Some(rejection_reason) = &patch.rejection_reason {
            builder.push(", rejection_reason = ").push_bind(rejection_reason.clone());
        }
        if let Some(message_id) = &patch.delivery_message_id {
            builder.push(", delivery_message_id = ").push_bind(message_id.clone());
        }

        builder.push(" WHERE id = ").push_bind(&id.0);
        builder.push(" AND status IN (");
        let mut statuses = builder.separated(", ");
        for accepted in accepted_from {
            statuses.push_bind(accepted.as_key());
        }
        builder.push(")");

        let result = builder.build().execute(&self.pool).await.map_err(backend)?;

        let quote = self.fetch(id).await?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if result.rows_affected() == 1 {
            Ok(TransitionOutcome::Applied(quote))
        } else {
            Ok(TransitionOutcome::Conflict(quote))
        }
    }

    async fn list_reminder_due(&self, cutoff: DateTime<Utc>) -> Result<Vec<Quote>, StoreError> {
        // Timestamps are stored as UTC RFC 3339 with a fixed precision, so
        // the range check can stay lexicographic.
        let ids: Vec<String> = sqlx::query(
            "SELECT id FROM quote
             WHERE status = 'sent' AND sent_at IS NOT NULL AND sent_at <= ?
             ORDER BY id",
        )
        .bind(fmt_ts(cutoff))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?
        .into_iter()
        .map(|row| row.get::<String, _>("id"))
        .collect();

        let mut due = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(quote) = self.fetch(&QuoteId(id)).await? {
                due.push(quote);
            }
        }
        Ok(due)
    }

    async fn apply_delivery_event(&self, event: &DeliveryEvent) -> Result<bool, StoreError> {
        let column = match event.event_type {
            DeliveryEventType::Delivered => "delivered_at",
            DeliveryEventType::Opened => "opened_at",
            DeliveryEventType::Clicked => "clicked_at",
            DeliveryEventType::Bounced => "bounced_at",
        };

        let result =
            sqlx::query(&format!("UPDATE quote SET {column} = ? WHERE delivery_message_id = ?"))
                .bind(fmt_ts(event.timestamp))
                .bind(&event.message_id)
                .execute(&self.pool)
                .await
                .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}

// Fixed-width nanosecond precision keeps string comparison equivalent to
// timestamp comparison and round trips chrono values exactly.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|error| StoreError::Backend(format!("bad timestamp `{raw}`: {error}")))
}

fn opt_ts(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
    row.get::<Option<String>, _>(column).as_deref().map(parse_ts).transpose()
}

fn quote_from_row(row: &SqliteRow, lines: Vec<QuoteLine>) -> Result<Quote, StoreError> {
    let status_key = row.get::<String, _>("status");
    let status: QuoteStatus = status_key
        .parse()
        .map_err(|error: String| StoreError::Backend(error))?;

    Ok(Quote {
        id: QuoteId(row.get::<String, _>("id")),
        customer: CustomerRef {
            name: row.get::<String, _>("customer_name"),
            email: row.get::<String, _>("customer_email"),
        },
        status,
        lines,
        created_at: parse_ts(&row.get::<String, _>("created_at"))?,
        sent_at: opt_ts(row, "sent_at")?,
        approved_at: opt_ts(row, "approved_at")?,
        rejected_at: opt_ts(row, "rejected_at")?,
        expired_at: opt_ts(row, "expired_at")?,
        reminder_sent_at: opt_ts(row, "reminder_sent_at")?,
        rejection_reason: row.get::<Option<String>, _>("rejection_reason"),
        delivery: DeliveryMetadata {
            message_id: row.get::<Option<String>, _>("delivery_message_id"),
            delivered_at: opt_ts(row, "delivered_at")?,
            opened_at: opt_ts(row, "opened_at")?,
            clicked_at: opt_ts(row, "clicked_at")?,
            bounced_at: opt_ts(row, "bounced_at")?,
        },
    })
}

fn line_from_row(row: SqliteRow) -> Result<QuoteLine, StoreError> {
    let unit_price_raw = row.get::<String, _>("unit_price");
    let unit_price: Decimal = unit_price_raw
        .parse()
        .map_err(|error| StoreError::Backend(format!("bad unit price `{unit_price_raw}`: {error}")))?;
    let quantity_raw = row.get::<i64, _>("quantity");
    let quantity = u32::try_from(quantity_raw)
        .map_err(|_| StoreError::Backend(format!("bad quantity `{quantity_raw}`")))?;
    Ok(QuoteLine { description: row.get::<String, _>("description"), quantity, unit_price })
}
