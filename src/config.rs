use std::time::Duration;

use crate::error::{AppError, Result};

pub const API_BASE_URL: &str = "https://api-sg.aliexpress.com/sync";

/// API version sent with every request.
pub const API_VERSION: &str = "2.0";

/// Signature method marker sent with every request.
pub const SIGN_METHOD: &str = "sha256";

/// Product fields requested from the product query method.
pub const PRODUCT_QUERY_FIELDS: &str = "product_id,product_title,target_sale_price,\
target_sale_price_currency,product_main_image_url,promotion_link,product_detail_url,\
original_price,original_price_currency,discount,evaluate_rate,lastest_volume,shop_name";

/// Exponential backoff ceiling for the retry wrapper.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Price floor below which the quality score takes a penalty.
pub const CHEAP_PRICE_FLOOR: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,

    // Marketplace API credentials and locale
    pub api_base_url: String,
    pub app_key: String,
    pub app_secret: String,
    pub tracking_id: String,
    pub target_currency: String,
    pub target_language: String,
    pub ship_to_country: String,
    /// Upper bound passed to the product query (API-side filter).
    pub max_sale_price: f64,
    /// Conversion rate applied when the API reports USD prices (USD_CONVERSION_RATE).
    pub usd_conversion_rate: f64,

    /// Fallback keyword list when the keywords table is empty (KEYWORDS, comma-separated).
    pub keywords: Vec<String>,

    // Cycle pacing (seconds)
    pub keyword_sleep: Duration,
    pub cycle_sleep: Duration,
    pub error_sleep: Duration,

    /// Successful enqueues allowed per keyword per cycle.
    pub max_products_per_keyword: usize,

    // Quality threshold defaults; the settings table overrides these per cycle.
    pub min_discount_percentage: f64,
    pub min_product_rating: f64,
    pub min_product_sales: u64,
    pub min_quantity_sold: u64,
    pub min_product_price: f64,
    pub max_product_price: f64,
    pub excluded_categories: Vec<String>,
    pub excluded_keywords: Vec<String>,

    // Outbound call throttling and retries
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    pub retry_max_retries: u32,
    pub retry_base_delay: Duration,

    /// Force-exit deadline after a shutdown request.
    pub watchdog_timeout: Duration,
    /// Queue entries older than this are pruned at startup.
    pub queue_retention_days: u32,
    /// Log a health report every N cycles.
    pub health_report_cycles: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let app_key = std::env::var("APP_KEY")
            .map_err(|_| AppError::Config("APP_KEY must be set".to_string()))?;
        let app_secret = std::env::var("APP_SECRET")
            .map_err(|_| AppError::Config("APP_SECRET must be set".to_string()))?;

        Ok(Self {
            log_level: env_or("LOG_LEVEL", "info"),
            db_path: env_or("DB_PATH", "dealscout.db"),
            api_base_url: env_or("API_BASE_URL", API_BASE_URL),
            app_key,
            app_secret,
            tracking_id: env_or("TRACKING_ID", "dealscout"),
            target_currency: env_or("TARGET_CURRENCY", "ILS"),
            target_language: env_or("TARGET_LANGUAGE", "IL"),
            ship_to_country: env_or("SHIP_TO_COUNTRY", "IL"),
            max_sale_price: parse_env("MAX_SALE_PRICE", 500.0)?,
            usd_conversion_rate: parse_env("USD_CONVERSION_RATE", 3.7)?,
            keywords: csv_env("KEYWORDS"),
            keyword_sleep: Duration::from_secs(parse_env("KEYWORD_SLEEP_SECS", 30u64)?),
            cycle_sleep: Duration::from_secs(parse_env("CYCLE_SLEEP_SECS", 900u64)?),
            error_sleep: Duration::from_secs(parse_env("ERROR_SLEEP_SECS", 300u64)?),
            max_products_per_keyword: parse_env("MAX_PRODUCTS_PER_KEYWORD", 3usize)?,
            min_discount_percentage: parse_env("MIN_DISCOUNT_PERCENTAGE", 15.0)?,
            min_product_rating: parse_env("MIN_PRODUCT_RATING", 4.0)?,
            min_product_sales: parse_env("MIN_PRODUCT_SALES", 5u64)?,
            min_quantity_sold: parse_env("MIN_QUANTITY_SOLD", 200u64)?,
            min_product_price: parse_env("MIN_PRODUCT_PRICE", 5.0)?,
            max_product_price: parse_env("MAX_PRODUCT_PRICE", 500.0)?,
            excluded_categories: csv_env("EXCLUDED_CATEGORIES"),
            excluded_keywords: csv_env("EXCLUDED_KEYWORDS"),
            rate_limit_max_requests: parse_env("RATE_LIMIT_MAX_REQUESTS", 10usize)?,
            rate_limit_window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECS", 60u64)?),
            retry_max_retries: parse_env("RETRY_MAX_RETRIES", 3u32)?,
            retry_base_delay: Duration::from_millis(parse_env("RETRY_BASE_DELAY_MS", 2000u64)?),
            watchdog_timeout: Duration::from_secs(parse_env("SHUTDOWN_WATCHDOG_SECS", 10u64)?),
            queue_retention_days: parse_env("QUEUE_RETENTION_DAYS", 30u32)?,
            health_report_cycles: parse_env("HEALTH_REPORT_CYCLES", 10u64)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

fn csv_env(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
