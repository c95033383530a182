use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Listing: one raw product record returned by a marketplace query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub product_id: String,
    pub title: String,
    pub sale_price: f64,
    pub original_price: f64,
    pub currency: String,
    pub discount: DiscountField,
    /// Shop rating, absent or 0 when the API reports none.
    pub rating: Option<f64>,
    /// Units sold; the API exposes a single volume field.
    pub sales_volume: Option<u64>,
    pub shop_name: Option<String>,
    pub image_url: String,
    pub detail_url: String,
    pub promotion_link: Option<String>,
}

/// The API's discount field arrives as a bare number, a percent-suffixed
/// string, or not at all. Resolved exactly once into a canonical percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscountField {
    Percent(f64),
    Raw(String),
    Missing,
}

impl DiscountField {
    /// Canonical discount percentage, rounded to one decimal when recomputed.
    ///
    /// Numeric values pass through; strings are parsed after stripping a
    /// trailing percent sign and thousands separators; anything else falls
    /// back to `(original - sale) / original * 100`.
    pub fn resolve(&self, original_price: f64, sale_price: f64) -> f64 {
        match self {
            DiscountField::Percent(p) => *p,
            DiscountField::Raw(s) => {
                let cleaned = s.replace('%', "").replace(',', "");
                match cleaned.trim().parse::<f64>() {
                    Ok(p) => p,
                    Err(_) => recompute_pct(original_price, sale_price),
                }
            }
            DiscountField::Missing => recompute_pct(original_price, sale_price),
        }
    }
}

fn recompute_pct(original_price: f64, sale_price: f64) -> f64 {
    if original_price <= 0.0 {
        return 0.0;
    }
    let pct = (original_price - sale_price) / original_price * 100.0;
    (pct * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// ScoredListing / QueueEntry
// ---------------------------------------------------------------------------

/// A listing that passed acceptance, plus its computed quality score.
#[derive(Debug, Clone)]
pub struct ScoredListing {
    pub listing: Listing,
    pub discount_pct: f64,
    pub quality_score: f64,
}

/// Persisted review-queue record. `display_title` is the auto-localized
/// title; `manual_title` is filled in later by the review workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
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
    pub sales_volume: Option<u64>,
    pub shop_name: Option<String>,
    pub image_url: String,
    pub detail_url: String,
    pub promotion_link: Option<String>,
    pub source_keyword: String,
    /// Unix seconds at enqueue time.
    pub created_at: i64,
}

// ---------------------------------------------------------------------------
// Query outcomes
// ---------------------------------------------------------------------------

/// Result of one product query after response classification.
#[derive(Debug)]
pub enum QueryOutcome {
    Listings(Vec<Listing>),
    /// The API is temporarily unusable; skip this keyword and cool down.
    Outage(OutageKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageKind {
    /// Body was an HTML maintenance page instead of JSON.
    Maintenance,
    /// The API rejected this caller's network address.
    IpRestricted,
}

impl std::fmt::Display for OutageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutageKind::Maintenance => write!(f, "maintenance"),
            OutageKind::IpRestricted => write!(f, "ip_restricted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discount_percent_passes_through() {
        assert_eq!(DiscountField::Percent(23.0).resolve(100.0, 77.0), 23.0);
    }

    #[test]
    fn discount_string_strips_percent_sign() {
        assert_eq!(DiscountField::Raw("23%".to_string()).resolve(100.0, 77.0), 23.0);
        assert_eq!(DiscountField::Raw(" 23.5% ".to_string()).resolve(100.0, 77.0), 23.5);
        assert_eq!(DiscountField::Raw("1,200%".to_string()).resolve(100.0, 77.0), 1200.0);
    }

    #[test]
    fn discount_missing_recomputes_from_prices() {
        let pct = DiscountField::Missing.resolve(100.0, 70.0);
        assert!((pct - 30.0).abs() < 0.1);
    }

    #[test]
    fn discount_unparseable_string_recomputes() {
        let pct = DiscountField::Raw("n/a".to_string()).resolve(50.0, 49.0);
        assert!((pct - 2.0).abs() < 0.1);
    }

    #[test]
    fn discount_recompute_rounds_to_one_decimal() {
        // (30 - 20) / 30 = 33.333...%
        let pct = DiscountField::Missing.resolve(30.0, 20.0);
        assert_eq!(pct, 33.3);
    }

    #[test]
    fn discount_zero_original_price_is_zero() {
        assert_eq!(DiscountField::Missing.resolve(0.0, 10.0), 0.0);
    }

    #[test]
    fn discount_forms_agree_within_tolerance() {
        let forms = [
            DiscountField::Raw("30%".to_string()),
            DiscountField::Percent(30.0),
            DiscountField::Missing,
        ];
        for form in forms {
            let pct = form.resolve(100.0, 70.0);
            assert!((pct - 30.0).abs() <= 0.1, "{form:?} resolved to {pct}");
        }
    }
}
