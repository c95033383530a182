use crate::config::Config;
use crate::db::QueueStore;
use crate::error::Result;

/// Quality thresholds for one cycle. Loaded fresh at the start of every
/// cycle: the settings store overrides the config defaults per key, so the
/// review tooling can tighten filters without a restart.
#[derive(Debug, Clone)]
pub struct FilterThresholds {
    pub min_discount_pct: f64,
    pub min_rating: f64,
    pub min_sales: u64,
    pub min_quantity: u64,
    pub min_price: f64,
    pub max_price: f64,
    pub excluded_categories: Vec<String>,
    pub excluded_keywords: Vec<String>,
}

impl FilterThresholds {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_discount_pct: cfg.min_discount_percentage,
            min_rating: cfg.min_product_rating,
            min_sales: cfg.min_product_sales,
            min_quantity: cfg.min_quantity_sold,
            min_price: cfg.min_product_price,
            max_price: cfg.max_product_price,
            excluded_categories: cfg.excluded_categories.clone(),
            excluded_keywords: cfg.excluded_keywords.clone(),
        }
    }

    pub async fn load(store: &QueueStore, cfg: &Config) -> Result<Self> {
        let mut t = Self::from_config(cfg);
        override_f64(store, "min_discount_percentage", &mut t.min_discount_pct).await?;
        override_f64(store, "min_product_rating", &mut t.min_rating).await?;
        override_u64(store, "min_product_sales", &mut t.min_sales).await?;
        override_u64(store, "min_quantity_sold", &mut t.min_quantity).await?;
        override_f64(store, "min_product_price", &mut t.min_price).await?;
        override_f64(store, "max_product_price", &mut t.max_price).await?;
        if let Some(raw) = store.get_setting("excluded_categories").await? {
            t.excluded_categories = split_csv(&raw);
        }
        if let Some(raw) = store.get_setting("excluded_keywords").await? {
            t.excluded_keywords = split_csv(&raw);
        }
        Ok(t)
    }
}

async fn override_f64(store: &QueueStore, key: &str, slot: &mut f64) -> Result<()> {
    if let Some(value) = store.get_setting(key).await?.and_then(|raw| raw.trim().parse().ok()) {
        *slot = value;
    }
    Ok(())
}

async fn override_u64(store: &QueueStore, key: &str, slot: &mut u64) -> Result<()> {
    if let Some(value) = store.get_setting(key).await?.and_then(|raw| raw.trim().parse().ok()) {
        *slot = value;
    }
    Ok(())
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn base_config() -> Config {
        Config {
            log_level: "info".to_string(),
            db_path: ":memory:".to_string(),
            api_base_url: "http://localhost".to_string(),
            app_key: "k".to_string(),
            app_secret: "s".to_string(),
            tracking_id: "t".to_string(),
            target_currency: "ILS".to_string(),
            target_language: "IL".to_string(),
            ship_to_country: "IL".to_string(),
            max_sale_price: 500.0,
            usd_conversion_rate: 3.7,
            keywords: Vec::new(),
            keyword_sleep: Duration::from_secs(0),
            cycle_sleep: Duration::from_secs(0),
            error_sleep: Duration::from_secs(0),
            max_products_per_keyword: 3,
            min_discount_percentage: 15.0,
            min_product_rating: 4.0,
            min_product_sales: 5,
            min_quantity_sold: 200,
            min_product_price: 5.0,
            max_product_price: 500.0,
            excluded_categories: vec!["adult".to_string()],
            excluded_keywords: Vec::new(),
            rate_limit_max_requests: 10,
            rate_limit_window: Duration::from_secs(60),
            retry_max_retries: 3,
            retry_base_delay: Duration::from_millis(1),
            watchdog_timeout: Duration::from_secs(10),
            queue_retention_days: 30,
            health_report_cycles: 10,
        }
    }

    #[tokio::test]
    async fn settings_override_config_defaults() {
        let store = QueueStore::connect_in_memory().await.unwrap();
        store.set_setting("min_discount_percentage", "25").await.unwrap();
        store.set_setting("excluded_keywords", "replica, fake").await.unwrap();

        let t = FilterThresholds::load(&store, &base_config()).await.unwrap();
        assert_eq!(t.min_discount_pct, 25.0);
        assert_eq!(t.excluded_keywords, vec!["replica", "fake"]);
        // Untouched keys keep their config defaults.
        assert_eq!(t.min_rating, 4.0);
        assert_eq!(t.excluded_categories, vec!["adult"]);
    }

    #[tokio::test]
    async fn unparseable_setting_falls_back_to_default() {
        let store = QueueStore::connect_in_memory().await.unwrap();
        store.set_setting("min_product_sales", "lots").await.unwrap();

        let t = FilterThresholds::load(&store, &base_config()).await.unwrap();
        assert_eq!(t.min_sales, 5);
    }
}
