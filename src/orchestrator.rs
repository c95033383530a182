use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::MarketplaceClient;
use crate::config::Config;
use crate::db::QueueStore;
use crate::error::{AppError, Result};
use crate::filter::{accepts, pre_filter, quality_score, validate_listing, FilterThresholds};
use crate::health::HealthMonitor;
use crate::translate::TitleLocalizer;
use crate::types::{Listing, OutageKind, QueryOutcome, QueueEntry, ScoredListing};

/// Outcome of one keyword pass.
enum KeywordPass {
    Queued(usize),
    Outage(OutageKind),
}

/// Drives the discovery loop: for every active keyword, fetch listings,
/// filter, score and enqueue, pacing each step with the configured sleeps.
/// One flaky keyword never aborts the cycle; only a shutdown request does.
pub struct Orchestrator {
    cfg: Config,
    client: MarketplaceClient,
    store: QueueStore,
    health: Arc<HealthMonitor>,
    localizer: Box<dyn TitleLocalizer>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        cfg: Config,
        client: MarketplaceClient,
        store: QueueStore,
        health: Arc<HealthMonitor>,
        localizer: Box<dyn TitleLocalizer>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { cfg, client, store, health, localizer, shutdown }
    }

    pub async fn run(self) -> Result<()> {
        if let Err(err) = self.store.prune_older_than(self.cfg.queue_retention_days).await {
            warn!(error = %err, "startup queue prune failed");
        }
        self.store.seed_keywords(&self.cfg.keywords).await?;

        let mut cycle: u64 = 0;
        while !self.shutdown.is_cancelled() {
            cycle += 1;
            info!(cycle, "starting discovery cycle");

            match self.run_cycle().await {
                Ok(queued) => info!(cycle, queued, "cycle complete"),
                Err(AppError::Cancelled) => break,
                Err(err) => {
                    error!(cycle, error = %err, "cycle failed");
                    self.health.record_failure(&err);
                    if !self.sleep_cancellable(self.cfg.error_sleep).await {
                        break;
                    }
                    continue;
                }
            }

            if self.cfg.health_report_cycles > 0 && cycle % self.cfg.health_report_cycles == 0 {
                info!(cycle, report = ?self.health.report(), "health report");
            }

            if !self.sleep_cancellable(self.cfg.cycle_sleep).await {
                break;
            }
        }

        info!(report = ?self.health.report(), "discovery loop stopped");
        Ok(())
    }

    /// One full pass over all active keywords. Thresholds are re-read first
    /// so settings edits apply without a restart.
    async fn run_cycle(&self) -> Result<usize> {
        let thresholds = FilterThresholds::load(&self.store, &self.cfg).await?;
        let keywords = self.store.active_keywords().await?;
        if keywords.is_empty() {
            warn!("no active keywords configured, nothing to discover");
            return Ok(0);
        }

        let mut queued_total = 0;
        for keyword in &keywords {
            if self.shutdown.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            match self.process_keyword(keyword, &thresholds).await {
                Ok(KeywordPass::Queued(queued)) => {
                    queued_total += queued;
                    if !self.sleep_cancellable(self.cfg.keyword_sleep).await {
                        return Err(AppError::Cancelled);
                    }
                }
                Ok(KeywordPass::Outage(kind)) => {
                    warn!(
                        keyword = %keyword,
                        outage = %kind,
                        cooldown_secs = self.cfg.error_sleep.as_secs(),
                        "API outage, cooling down before next keyword"
                    );
                    if !self.sleep_cancellable(self.cfg.error_sleep).await {
                        return Err(AppError::Cancelled);
                    }
                }
                Err(AppError::Cancelled) => return Err(AppError::Cancelled),
                Err(err) => {
                    // Per-keyword isolation: report and move on.
                    error!(keyword = %keyword, error = %err, "keyword pass failed");
                    self.health.record_keyword_error();
                    if !self.sleep_cancellable(self.cfg.keyword_sleep).await {
                        return Err(AppError::Cancelled);
                    }
                }
            }
        }
        Ok(queued_total)
    }

    /// Fetch → pre-filter → validate → accept → score → enqueue for one
    /// keyword, stopping after `max_products_per_keyword` successful
    /// enqueues.
    async fn process_keyword(
        &self,
        keyword: &str,
        thresholds: &FilterThresholds,
    ) -> Result<KeywordPass> {
        info!(keyword, "querying products");
        let listings = match self.client.query_products(keyword).await? {
            QueryOutcome::Outage(kind) => return Ok(KeywordPass::Outage(kind)),
            QueryOutcome::Listings(listings) => listings,
        };

        let (candidates, stats) = pre_filter(listings, thresholds);
        info!(
            keyword,
            total = stats.total,
            candidates = stats.accepted,
            no_discount = stats.rejected_no_discount,
            low_discount = stats.rejected_low_discount,
            low_rating = stats.rejected_low_rating,
            low_sales = stats.rejected_low_sales,
            "pre-filter complete"
        );

        let mut queued = 0;
        for listing in candidates {
            if self.shutdown.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            if queued >= self.cfg.max_products_per_keyword {
                break;
            }

            if !validate_listing(&listing) {
                self.health.record_discarded_listing();
                debug!(product_id = %listing.product_id, "listing failed structural validation");
                continue;
            }

            let discount_pct = match accepts(&listing, thresholds) {
                Ok(pct) => pct,
                Err(reason) => {
                    debug!(product_id = %listing.product_id, reason = %reason, "listing rejected");
                    continue;
                }
            };

            // Skip known ids before spending a link-generation call on them.
            if self.store.is_posted(&listing.product_id).await?
                || self.store.is_queued(&listing.product_id).await?
            {
                debug!(product_id = %listing.product_id, "already queued or posted, skipping");
                continue;
            }

            let score = quality_score(&listing, discount_pct);
            let promotion_link = self.promotion_link_for(&listing).await?;
            let scored = ScoredListing { listing, discount_pct, quality_score: score };
            let entry = self.build_entry(scored, keyword, promotion_link);

            if self.store.enqueue(&entry).await? {
                queued += 1;
                info!(
                    product_id = %entry.product_id,
                    title = %entry.title,
                    discount_pct,
                    score,
                    "deal queued for review"
                );
            } else {
                debug!(product_id = %entry.product_id, "already queued or posted, skipping");
            }
        }

        Ok(KeywordPass::Queued(queued))
    }

    /// Use the promotion link the query already returned; otherwise ask the
    /// link-generation method, falling back to no link on failure.
    async fn promotion_link_for(&self, listing: &Listing) -> Result<Option<String>> {
        if listing.promotion_link.is_some() {
            return Ok(listing.promotion_link.clone());
        }
        match self.client.generate_affiliate_link(&listing.detail_url).await {
            Ok(link) => Ok(link),
            Err(AppError::Cancelled) => Err(AppError::Cancelled),
            Err(err) => {
                warn!(
                    product_id = %listing.product_id,
                    error = %err,
                    "affiliate link generation failed, keeping plain detail URL"
                );
                Ok(None)
            }
        }
    }

    fn build_entry(
        &self,
        scored: ScoredListing,
        keyword: &str,
        promotion_link: Option<String>,
    ) -> QueueEntry {
        let ScoredListing { listing, discount_pct, quality_score } = scored;
        QueueEntry {
            product_id: listing.product_id,
            display_title: self.localizer.localize(&listing.title),
            title: listing.title,
            manual_title: String::new(),
            sale_price: listing.sale_price,
            currency: listing.currency,
            original_price: listing.original_price,
            discount_pct,
            quality_score,
            rating: listing.rating,
            sales_volume: listing.sales_volume,
            shop_name: listing.shop_name,
            image_url: listing.image_url,
            detail_url: listing.detail_url,
            promotion_link,
            source_keyword: keyword.to_string(),
            created_at: now_secs(),
        }
    }

    /// Returns `false` when the sleep was interrupted by shutdown.
    async fn sleep_cancellable(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.shutdown.is_cancelled();
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
