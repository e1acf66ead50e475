//! Provider request signing.
//!
//! Both signers are pure functions of their inputs: the caller supplies the
//! timestamp, so identical inputs always reproduce the identical signature.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Timestamp format embedded in the HMAC authorization header.
pub const HMAC_DATE_FORMAT: &str = "%y%m%dT%H%M%SZ";

/// Errors from signature construction.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("URI has more than one query delimiter: {0:?}")]
    MalformedUri(String),
    #[error("secret key rejected by HMAC")]
    InvalidKey,
}

/// Coupang-style CEA authorization header.
///
/// Canonical string is `datetime + METHOD + path + query` over the URI split
/// at `?`; the header places the hex HMAC-SHA256 alongside the access key and
/// signed date, with no spaces after the commas.
pub fn hmac_authorization(
    access_key: &str,
    secret_key: &str,
    method: &str,
    uri: &str,
    signed_at: DateTime<Utc>,
) -> Result<String, SignError> {
    let parts: Vec<&str> = uri.split('?').collect();
    if parts.len() > 2 {
        return Err(SignError::MalformedUri(uri.to_string()));
    }
    let path = parts[0];
    let query = if parts.len() == 2 { parts[1] } else { "" };

    let datetime = signed_at.format(HMAC_DATE_FORMAT).to_string();
    let message = format!("{datetime}{method}{path}{query}");

    let mut mac =
        HmacSha256::new_from_slice(secret_key.as_bytes()).map_err(|_| SignError::InvalidKey)?;
    mac.update(message.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!(
        "CEA algorithm=HmacSHA256,access-key={access_key},signed-date={datetime},signature={signature}"
    ))
}

/// AliExpress-style MD5 signature.
///
/// Parameters are sorted lexicographically by key, concatenated as
/// `key + value` pairs with no separators, wrapped in the secret on both
/// sides, MD5-hashed, and rendered as uppercase hex.
pub fn md5_signature(secret: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut base = String::with_capacity(
        2 * secret.len() + params.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>(),
    );
    base.push_str(secret);
    for (key, value) in sorted {
        base.push_str(key);
        base.push_str(value);
    }
    base.push_str(secret);

    hex::encode_upper(Md5::digest(base.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_hmac_deterministic() {
        let a = hmac_authorization("ak", "sk", "GET", "/v2/search?keyword=x", fixed_time()).unwrap();
        let b = hmac_authorization("ak", "sk", "GET", "/v2/search?keyword=x", fixed_time()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hmac_header_shape() {
        let header =
            hmac_authorization("my-access", "sk", "GET", "/v2/search?keyword=x", fixed_time())
                .unwrap();
        assert!(header.starts_with("CEA algorithm=HmacSHA256,access-key=my-access,signed-date="));
        assert!(header.contains("signed-date=240517T083000Z"));
        // No spaces after commas
        assert!(!header.contains(", "));
    }

    #[test]
    fn test_hmac_sensitive_to_every_input() {
        let base = hmac_authorization("ak", "sk", "GET", "/p?q=1", fixed_time()).unwrap();
        let sig = |h: &str| h.rsplit("signature=").next().unwrap().to_string();

        let other_method = hmac_authorization("ak", "sk", "POST", "/p?q=1", fixed_time()).unwrap();
        let other_path = hmac_authorization("ak", "sk", "GET", "/q?q=1", fixed_time()).unwrap();
        let other_query = hmac_authorization("ak", "sk", "GET", "/p?q=2", fixed_time()).unwrap();
        let other_secret = hmac_authorization("ak", "s2", "GET", "/p?q=1", fixed_time()).unwrap();
        let other_time =
            hmac_authorization("ak", "sk", "GET", "/p?q=1", fixed_time() + chrono::Duration::seconds(1))
                .unwrap();

        for other in [other_method, other_path, other_query, other_secret, other_time] {
            assert_ne!(sig(&base), sig(&other));
        }
    }

    #[test]
    fn test_hmac_rejects_double_query_delimiter() {
        assert!(matches!(
            hmac_authorization("ak", "sk", "GET", "/p?a=1?b=2", fixed_time()),
            Err(SignError::MalformedUri(_))
        ));
    }

    #[test]
    fn test_md5_order_independent() {
        let forward = vec![
            ("app_key".to_string(), "123".to_string()),
            ("method".to_string(), "product.query".to_string()),
            ("timestamp".to_string(), "2024-05-17 08:30:00".to_string()),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(
            md5_signature("secret", &forward),
            md5_signature("secret", &reversed)
        );
    }

    #[test]
    fn test_md5_uppercase_hex() {
        let sig = md5_signature("secret", &[("a".to_string(), "1".to_string())]);
        assert_eq!(sig.len(), 32);
        assert!(sig.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_md5_sensitive_to_params_and_secret() {
        let params = vec![("a".to_string(), "1".to_string())];
        let base = md5_signature("secret", &params);

        assert_ne!(base, md5_signature("other", &params));
        assert_ne!(
            base,
            md5_signature("secret", &[("a".to_string(), "2".to_string())])
        );
        assert_ne!(
            base,
            md5_signature("secret", &[("b".to_string(), "1".to_string())])
        );
    }
}
