use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::QueueEntryRow;
use crate::error::Result;
use crate::types::QueueEntry;

/// Persistence for the review queue, the posted set, and the
/// settings/keyword store. Product identity is the marketplace's own item
/// id, never a URL, since the same item is reachable through many
/// decorated URLs.
pub struct QueueStore {
    pool: SqlitePool,
}

impl QueueStore {
    pub async fn connect(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database for tests; a wider pool would
    /// hand each connection its own empty database.
    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    // -- dedup membership ---------------------------------------------------

    pub async fn is_posted(&self, product_id: &str) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM posted WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn is_queued(&self, product_id: &str) -> Result<bool> {
        let row = sqlx::query_scalar::<_, i64>("SELECT 1 FROM queue WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Insert a queue entry unless its product id is already queued or
    /// posted. Returns `false` on a duplicate instead of erroring; the
    /// PRIMARY KEY backs the at-most-one-entry-per-id guarantee even if a
    /// second writer ever appears.
    pub async fn enqueue(&self, entry: &QueueEntry) -> Result<bool> {
        if self.is_posted(&entry.product_id).await? {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO queue (
                product_id, title, display_title, manual_title,
                sale_price, currency, original_price, discount_pct, quality_score,
                rating, sales_volume, shop_name,
                image_url, detail_url, promotion_link,
                source_keyword, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(product_id) DO NOTHING
            "#,
        )
        .bind(&entry.product_id)
        .bind(&entry.title)
        .bind(&entry.display_title)
        .bind(&entry.manual_title)
        .bind(entry.sale_price)
        .bind(&entry.currency)
        .bind(entry.original_price)
        .bind(entry.discount_pct)
        .bind(entry.quality_score)
        .bind(entry.rating)
        .bind(entry.sales_volume.map(|v| v as i64))
        .bind(&entry.shop_name)
        .bind(&entry.image_url)
        .bind(&entry.detail_url)
        .bind(&entry.promotion_link)
        .bind(&entry.source_keyword)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn fetch_entry(&self, product_id: &str) -> Result<Option<QueueEntry>> {
        let row = sqlx::query_as::<_, QueueEntryRow>("SELECT * FROM queue WHERE product_id = ?")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(QueueEntry::from))
    }

    /// Publisher-side: move a product id into the posted set permanently.
    pub async fn mark_posted(&self, product_id: &str, message_ref: Option<&str>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO posted (product_id, message_ref, posted_at) VALUES (?, ?, ?)
             ON CONFLICT(product_id) DO UPDATE SET message_ref = excluded.message_ref",
        )
        .bind(product_id)
        .bind(message_ref)
        .bind(now_secs())
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM queue WHERE product_id = ?")
            .bind(product_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Maintenance: drop queue entries that sat unreviewed for too long.
    pub async fn prune_older_than(&self, days: u32) -> Result<u64> {
        let cutoff = now_secs() - i64::from(days) * 86_400;
        let result = sqlx::query("DELETE FROM queue WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        let pruned = result.rows_affected();
        if pruned > 0 {
            info!(pruned, days, "pruned stale queue entries");
        }
        Ok(pruned)
    }

    // -- settings / keywords ------------------------------------------------

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Active keywords in stable iteration order.
    pub async fn active_keywords(&self) -> Result<Vec<String>> {
        let keywords = sqlx::query_scalar::<_, String>(
            "SELECT keyword FROM keywords WHERE active = 1 ORDER BY position, keyword",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(keywords)
    }

    /// Insert the configured keyword list on first run; existing rows
    /// (including deactivated ones) are left untouched.
    pub async fn seed_keywords(&self, keywords: &[String]) -> Result<()> {
        for (position, keyword) in keywords.iter().enumerate() {
            sqlx::query(
                "INSERT INTO keywords (keyword, active, position) VALUES (?, 1, ?)
                 ON CONFLICT(keyword) DO NOTHING",
            )
            .bind(keyword)
            .bind(position as i64)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
