use sqlx::{Executor, Row};

use printshop_core::store::StoreError;

use crate::DbPool;

/// Deterministic demo quotes for local development and smoke tests. Loading
/// is idempotent: existing seed rows are replaced.
pub struct SeedDataset;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub quotes: u64,
    pub lines: u64,
}

const SEED_QUOTE_IDS: &[&str] = &["quote-demo-draft", "quote-demo-sent", "quote-demo-approved"];

impl SeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/seed_quotes.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, StoreError> {
        let mut tx = pool.begin().await.map_err(backend)?;
        tx.execute(sqlx::query(Self::SQL)).await.map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        let mut result = SeedResult { quotes: 0, lines: 0 };
        for id in SEED_QUOTE_IDS {
            result.quotes += sqlx::query("SELECT COUNT(*) AS count FROM quote WHERE id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .map_err(backend)?
                .get::<i64, _>("count") as u64;
            result.lines += sqlx::query("SELECT COUNT(*) AS count FROM quote_line WHERE quote_id = ?")
                .bind(id)
                .fetch_one(pool)
                .await
                .map_err(backend)?
                .get::<i64, _>("count") as u64;
        }
        Ok(result)
    }
}

fn backend(error: sqlx::Error) -> StoreError {
    StoreError::Backend(error.to_string())
}
