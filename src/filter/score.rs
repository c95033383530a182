use crate::config::CHEAP_PRICE_FLOOR;
use crate::types::Listing;

/// Heuristic quality score for review-queue prioritization. Discount depth
/// dominates; reputation signals (rating, sales volume, shop name) add step
/// bonuses; a very cheap price takes a flat penalty. Non-negative.
pub fn quality_score(listing: &Listing, discount_pct: f64) -> f64 {
    let mut score = (discount_pct * 2.0).min(100.0);

    if let Some(rating) = listing.rating {
        score += if rating >= 4.5 {
            30.0
        } else if rating >= 4.0 {
            20.0
        } else if rating >= 3.5 {
            10.0
        } else {
            0.0
        };
    }

    if let Some(volume) = listing.sales_volume {
        score += if volume >= 100 {
            25.0
        } else if volume >= 50 {
            15.0
        } else if volume >= 10 {
            10.0
        } else {
            0.0
        };
    }

    if let Some(shop) = &listing.shop_name {
        let lowered = shop.to_lowercase();
        if lowered.contains("store") || lowered.contains("shop") {
            score += 10.0;
        }
    }

    if listing.sale_price < CHEAP_PRICE_FLOOR {
        score -= 10.0;
    }

    score.max(0.0)
}
