use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed-hash request signature: parameters sorted by key, concatenated as
/// `key+value`, HMAC-SHA256 under the app secret, uppercase hex.
///
/// Order-independent by construction: the BTreeMap iterates sorted.
pub fn sign(params: &BTreeMap<String, String>, secret: &str) -> String {
    let mut joined = String::new();
    for (key, value) in params {
        joined.push_str(key);
        joined.push_str(value);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(joined.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}
