use tracing::debug;

use crate::filter::thresholds::FilterThresholds;
use crate::types::Listing;

/// Why a listing was rejected. Carried in logs and pre-filter stats.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NoDiscount,
    LowDiscount,
    LowRating,
    LowSales,
    PriceOutOfRange,
    ExcludedTerm(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoDiscount => write!(f, "no_discount"),
            RejectReason::LowDiscount => write!(f, "low_discount"),
            RejectReason::LowRating => write!(f, "low_rating"),
            RejectReason::LowSales => write!(f, "low_sales"),
            RejectReason::PriceOutOfRange => write!(f, "price_out_of_range"),
            RejectReason::ExcludedTerm(term) => write!(f, "excluded_term:{term}"),
        }
    }
}

/// Per-reason rejection counters for one fetched batch.
#[derive(Debug, Default)]
pub struct FilterStats {
    pub total: usize,
    pub rejected_no_discount: usize,
    pub rejected_low_discount: usize,
    pub rejected_low_rating: usize,
    pub rejected_low_sales: usize,
    pub accepted: usize,
}

/// Cheap batch filter applied to every fetched listing before any per-item
/// work: real discount, discount depth, rating floor, sales floor. Missing
/// rating/sales are treated as no information and pass.
pub fn pre_filter(
    listings: Vec<Listing>,
    thresholds: &FilterThresholds,
) -> (Vec<Listing>, FilterStats) {
    let mut stats = FilterStats {
        total: listings.len(),
        ..FilterStats::default()
    };

    let kept = listings
        .into_iter()
        .filter(|listing| match cheap_checks(listing, thresholds) {
            Ok(()) => true,
            Err(reason) => {
                match reason {
                    RejectReason::NoDiscount => stats.rejected_no_discount += 1,
                    RejectReason::LowDiscount => stats.rejected_low_discount += 1,
                    RejectReason::LowRating => stats.rejected_low_rating += 1,
                    RejectReason::LowSales => stats.rejected_low_sales += 1,
                    _ => {}
                }
                debug!(product_id = %listing.product_id, reason = %reason, "pre-filter reject");
                false
            }
        })
        .collect::<Vec<_>>();

    stats.accepted = kept.len();
    (kept, stats)
}

/// Full acceptance check for one listing about to be queued, against the
/// current (possibly settings-updated) thresholds. Repeats the cheap checks,
/// then enforces the price band and the excluded-term lists.
/// Returns the resolved discount percentage on success.
pub fn accepts(listing: &Listing, thresholds: &FilterThresholds) -> Result<f64, RejectReason> {
    cheap_checks(listing, thresholds)?;

    if listing.sale_price < thresholds.min_price || listing.sale_price > thresholds.max_price {
        return Err(RejectReason::PriceOutOfRange);
    }

    let title = listing.title.to_lowercase();
    for term in thresholds
        .excluded_categories
        .iter()
        .chain(thresholds.excluded_keywords.iter())
    {
        let needle = term.trim().to_lowercase();
        if !needle.is_empty() && title.contains(&needle) {
            return Err(RejectReason::ExcludedTerm(term.clone()));
        }
    }

    Ok(listing.discount.resolve(listing.original_price, listing.sale_price))
}

fn cheap_checks(listing: &Listing, thresholds: &FilterThresholds) -> Result<(), RejectReason> {
    if listing.original_price <= listing.sale_price {
        return Err(RejectReason::NoDiscount);
    }

    let discount_pct = listing
        .discount
        .resolve(listing.original_price, listing.sale_price);
    if discount_pct < thresholds.min_discount_pct {
        return Err(RejectReason::LowDiscount);
    }

    if let Some(rating) = listing.rating {
        if rating < thresholds.min_rating {
            return Err(RejectReason::LowRating);
        }
    }

    if let Some(volume) = listing.sales_volume {
        if volume < thresholds.min_sales || volume < thresholds.min_quantity {
            return Err(RejectReason::LowSales);
        }
    }

    Ok(())
}

/// Structural integrity: a listing we cannot key, describe, or link to is
/// discarded outright and never counted against the thresholds.
pub fn validate_listing(listing: &Listing) -> bool {
    !listing.product_id.is_empty()
        && !listing.title.is_empty()
        && listing.sale_price > 0.0
        && listing.detail_url.starts_with("http")
}
