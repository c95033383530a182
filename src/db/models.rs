//! Database row types matching the schema in `migrations/`.
//! Used by sqlx for typed queries.

use crate::types::QueueEntry;

#[derive(Debug, sqlx::FromRow)]
pub struct QueueEntryRow {
    pub product_id: String,
    pub title: String,
    pub display_title: String,
    pub manual_title: String,
    pub sale_price: f64,
    pub currency: String,
    pub original_price: f64,
    pub discount_pct: f64,
    pub quality_score: f64,
    pub rating: Option<f64>,
    pub sales_volume: Option<i64>,
    pub shop_name: Option<String>,
    pub image_url: String,
    pub detail_url: String,
    pub promotion_link: Option<String>,
    pub source_keyword: String,
    pub created_at: i64,
}

impl From<QueueEntryRow> for QueueEntry {
    fn from(row: QueueEntryRow) -> Self {
        QueueEntry {
            product_id: row.product_id,
            title: row.title,
            display_title: row.display_title,
            manual_title: row.manual_title,
            sale_price: row.sale_price,
            currency: row.currency,
            original_price: row.original_price,
            discount_pct: row.discount_pct,
            quality_score: row.quality_score,
            rating: row.rating,
            sales_volume: row.sales_volume.map(|v| v as u64),
            shop_name: row.shop_name,
            image_url: row.image_url,
            detail_url: row.detail_url,
            promotion_link: row.promotion_link,
            source_keyword: row.source_keyword,
            created_at: row.created_at,
        }
    }
}
