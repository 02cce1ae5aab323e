//! HS256 bearer tokens.
//!
//! A token proves only that it was signed with the configured key: there is
//! no subject and no expiry. `iat` and `jti` are set so two issued tokens never
//! share content, but verification does not look at them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Map, Value};

use crate::error::{AuthError, ConfigError};

pub type Claims = Map<String, Value>;

const BEARER_PREFIX: &str = "Bearer ";

pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    seq: AtomicU64,
}

impl TokenAuthority {
    pub fn new(secret: &[u8]) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::InvalidSetting { name: "jwt_secret", reason: "must not be empty".into() });
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            seq: AtomicU64::new(0),
        })
    }

    pub fn issue_token(&self) -> Result<String, AuthError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let claims = json!({
            "iat": now.as_secs(),
            "jti": format!("{:x}-{seq}", now.as_nanos()),
        });
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| AuthError::Signing(e.to_string()))
    }

    /// Verifies an `Authorization` header value, with or without the `Bearer ` prefix.
    pub fn verify_token(&self, header: &str) -> Result<Claims, AuthError> {
        let raw = header.strip_prefix(BEARER_PREFIX).unwrap_or(header).trim();
        if raw.is_empty() {
            return Err(AuthError::Missing);
        }
        decode::<Claims>(raw, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    AuthError::Malformed(e.to_string())
                }
                _ => AuthError::Unauthorized(e.to_string()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_with_and_without_prefix() {
        let auth = TokenAuthority::new(b"secretkey").unwrap();
        let token = auth.issue_token().unwrap();
        assert_eq!(token.split('.').count(), 3);
        let bare = auth.verify_token(&token).unwrap();
        let prefixed = auth.verify_token(&format!("Bearer {token}")).unwrap();
        assert_eq!(bare, prefixed);
        assert!(bare.contains_key("iat"));
    }

    #[test]
    fn tokens_differ_in_content() {
        let auth = TokenAuthority::new(b"secretkey").unwrap();
        assert_ne!(auth.issue_token().unwrap(), auth.issue_token().unwrap());
    }

    #[test]
    fn other_key_is_unauthorized() {
        let ours = TokenAuthority::new(b"secretkey").unwrap();
        let theirs = TokenAuthority::new(b"another-key").unwrap();
        let token = theirs.issue_token().unwrap();
        assert!(matches!(ours.verify_token(&format!("Bearer {token}")), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn garbage_is_malformed() {
        let auth = TokenAuthority::new(b"secretkey").unwrap();
        assert!(matches!(auth.verify_token("Bearer not-a-token"), Err(AuthError::Malformed(_))));
        assert!(matches!(auth.verify_token("a.b.c"), Err(AuthError::Malformed(_))));
        assert!(matches!(auth.verify_token(""), Err(AuthError::Missing)));
        assert!(matches!(auth.verify_token("Bearer "), Err(AuthError::Missing)));
    }

    #[test]
    fn other_algorithm_is_rejected() {
        let auth = TokenAuthority::new(b"secretkey").unwrap();
        let token = encode(&Header::new(Algorithm::HS512), &json!({}), &EncodingKey::from_secret(b"secretkey")).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(AuthError::Unauthorized(_))));
    }

    #[test]
    fn empty_secret_is_a_config_error() {
        assert!(TokenAuthority::new(b"").is_err());
    }
}
