use serde_json::Value;

use crate::error::{AppError, Result};

pub const PRODUCT_QUERY_METHOD: &str = "aliexpress.affiliate.product.query";
pub const LINK_GENERATE_METHOD: &str = "aliexpress.affiliate.link.generate";

/// Known success envelopes: `<method with dots replaced>_response`.
const KNOWN_ENVELOPES: &[&str] = &[
    "aliexpress_affiliate_product_query_response",
    "aliexpress_affiliate_link_generate_response",
];

/// Error code returned when the caller's network address is not allowlisted.
const IP_RESTRICTED_CODE: &str = "AppWhiteIpLimit";

/// One marketplace response, classified.
#[derive(Debug)]
pub enum ApiResponse {
    /// Full parsed document containing a known response envelope.
    Success(Value),
    /// Outage: an HTML maintenance page instead of JSON.
    Maintenance,
    /// Outage: the API refused this caller's network address.
    IpRestricted,
    /// Client-side error (bad method, bad path, bad params); never retried.
    InvalidRequest { code: String, message: String },
    /// Valid JSON, but no envelope or error structure we know.
    Unrecognized,
}

/// Classify a raw response body.
///
/// A body that is neither JSON nor a maintenance page is a transient
/// `Unparseable` error so the retry wrapper gets another attempt at it.
pub fn classify(body: &str) -> Result<ApiResponse> {
    let trimmed = body.trim_start();
    if is_maintenance_page(trimmed) {
        return Ok(ApiResponse::Maintenance);
    }

    let doc: Value = serde_json::from_str(trimmed)
        .map_err(|_| AppError::Unparseable(snippet(body)))?;

    if let Some(err) = doc.get("error_response") {
        let code = field_string(err, "code");
        let message = field_string(err, "msg");
        if code == IP_RESTRICTED_CODE {
            return Ok(ApiResponse::IpRestricted);
        }
        return Ok(ApiResponse::InvalidRequest { code, message });
    }

    if KNOWN_ENVELOPES.iter().any(|env| doc.get(env).is_some()) {
        return Ok(ApiResponse::Success(doc));
    }

    Ok(ApiResponse::Unrecognized)
}

/// Envelope name for a dotted method name, e.g.
/// `aliexpress.affiliate.product.query` → `aliexpress_affiliate_product_query_response`.
pub fn envelope_for(method: &str) -> String {
    format!("{}_response", method.replace('.', "_"))
}

fn is_maintenance_page(trimmed: &str) -> bool {
    let prefix = b"<!doctype";
    trimmed.len() >= prefix.len()
        && trimmed.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// Error fields arrive as strings or numbers depending on the gateway.
fn field_string(err: &Value, key: &str) -> String {
    match err.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn snippet(body: &str) -> String {
    let mut s: String = body.chars().take(200).collect();
    if body.len() > s.len() {
        s.push_str("...");
    }
    s
}
