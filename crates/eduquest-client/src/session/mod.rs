//! Session tokens
//!
//! A [`Session`] is the access/refresh token pair held for the logged-in
//! user. Tokens issued by the EduQuest backends are JWTs, so this module can
//! also read their claims, for information only; the signature is never
//! checked on the client.
//!
//! # Example
//!
//! ```rust
//! use eduquest_client::session::{Session, is_jwt_expired};
//!
//! let session = Session::new("A1", Some("R1".to_string()));
//! assert!(session.has_refresh_token());
//!
//! // Opaque tokens have no readable expiry and count as expired
//! assert!(is_jwt_expired(&session.access_token));
//! ```

mod store;

pub use store::SessionStore;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while reading token claims
#[derive(Debug, Error)]
pub enum SessionError {
    /// JWT could not be decoded
    #[error("JWT parsing error: {0}")]
    JwtParseError(#[from] jsonwebtoken::errors::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Field names a backend may use for the access token
pub(crate) const ACCESS_TOKEN_FIELDS: [&str; 4] = ["access", "access_token", "accessToken", "token"];

/// Field names a backend may use for the refresh token
pub(crate) const REFRESH_TOKEN_FIELDS: [&str; 3] = ["refresh", "refresh_token", "refreshToken"];

/// Token pair for the logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Short-lived bearer credential
    pub access_token: String,
    /// Credential used only to mint new access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Session {
    /// Create a session
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token }
    }

    /// Whether a refresh can be attempted
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// Read the token pair out of a login or refresh response body
    ///
    /// Returns `None` when no access token field is present.
    pub fn from_response(body: &serde_json::Value) -> Option<Self> {
        let access_token = find_token(body, &ACCESS_TOKEN_FIELDS)?;
        let refresh_token = find_token(body, &REFRESH_TOKEN_FIELDS);
        Some(Self { access_token, refresh_token })
    }

    /// Expiry of the access token, if it is a JWT with an `exp` claim
    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        get_jwt_expiration(&self.access_token)
    }
}

pub(crate) fn find_token(body: &serde_json::Value, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .find_map(|field| body.get(field).and_then(|v| v.as_str()))
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// JWT claims structure
///
/// SimpleJWT tokens carry `token_type`, `jti` and `user_id` next to the
/// registered claims; anything else lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Token type ("access" or "refresh")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    /// Issued at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// User id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,

    /// Additional claims
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Parse JWT claims without validation
///
/// Should only be used for informational purposes such as logging when a
/// restored token has already expired.
pub fn parse_jwt_claims(token: &str) -> Result<JwtClaims> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<JwtClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;

    Ok(token_data.claims)
}

/// Get the expiration time from a JWT token
///
/// Returns None if the token doesn't have an expiration claim or if parsing fails.
pub fn get_jwt_expiration(token: &str) -> Option<DateTime<Utc>> {
    let claims = parse_jwt_claims(token).ok()?;
    claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// Check if a JWT token is expired
///
/// Tokens without a readable `exp` claim count as expired.
pub fn is_jwt_expired(token: &str) -> bool {
    match get_jwt_expiration(token) {
        Some(exp_time) => exp_time <= Utc::now(),
        None => true,
    }
}

/// Check if a JWT token will expire within `threshold`
pub fn is_jwt_expiring_soon(token: &str, threshold: Duration) -> bool {
    match get_jwt_expiration(token) {
        Some(exp_time) => exp_time <= Utc::now() + threshold,
        None => true,
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use super::JwtClaims;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    /// Sign an access token that expires `ttl` from now
    pub fn access_token(ttl: Duration) -> String {
        let claims = JwtClaims {
            token_type: Some("access".to_string()),
            iat: Some(Utc::now().timestamp()),
            exp: Some((Utc::now() + ttl).timestamp()),
            user_id: Some(serde_json::json!(7)),
            extra: serde_json::json!({"jti": "abc"}),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(b"test_secret"))
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_new() {
        let session = Session::new("A1", Some("R1".to_string()));
        assert_eq!(session.access_token, "A1");
        assert!(session.has_refresh_token());

        let session = Session::new("A1", None);
        assert!(!session.has_refresh_token());

        let session = Session::new("A1", Some(String::new()));
        assert!(!session.has_refresh_token());
    }

    #[test]
    fn test_session_serialization() {
        let session = Session::new("A1", Some("R1".to_string()));
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json, json!({"accessToken": "A1", "refreshToken": "R1"}));

        let no_refresh: Session = serde_json::from_value(json!({"accessToken": "A1"})).unwrap();
        assert_eq!(no_refresh.refresh_token, None);
    }

    #[test]
    fn test_from_admin_response() {
        let session = Session::from_response(&json!({"access": "A1", "refresh": "R1"})).unwrap();
        assert_eq!(session, Session::new("A1", Some("R1".to_string())));
    }

    #[test]
    fn test_from_portal_response() {
        let body = json!({"token": "T1", "profesor": {"id": 3, "nombre": "Ana"}});
        let session = Session::from_response(&body).unwrap();
        assert_eq!(session.access_token, "T1");
        assert!(session.refresh_token.is_none());
    }

    #[test]
    fn test_from_response_missing_token() {
        assert!(Session::from_response(&json!({"detail": "ok"})).is_none());
        assert!(Session::from_response(&json!({"access": ""})).is_none());
        assert!(Session::from_response(&json!("A1")).is_none());
    }

    #[test]
    fn test_parse_jwt_claims() {
        let token = test_tokens::access_token(Duration::hours(1));
        let claims = parse_jwt_claims(&token).unwrap();

        assert_eq!(claims.token_type.as_deref(), Some("access"));
        assert_eq!(claims.user_id, Some(json!(7)));
        assert_eq!(claims.extra["jti"], "abc");
        assert!(claims.exp.is_some());
    }

    #[test]
    fn test_get_jwt_expiration() {
        let token = test_tokens::access_token(Duration::hours(2));
        let expected = Utc::now() + Duration::hours(2);

        let parsed = get_jwt_expiration(&token).unwrap();
        let diff = (parsed.timestamp() - expected.timestamp()).abs();
        assert!(diff <= 1, "Expiration time should match within 1 second");
    }

    #[test]
    fn test_is_jwt_expired() {
        assert!(!is_jwt_expired(&test_tokens::access_token(Duration::hours(1))));
        assert!(is_jwt_expired(&test_tokens::access_token(Duration::hours(-1))));
    }

    #[test]
    fn test_opaque_token_counts_as_expired() {
        assert!(parse_jwt_claims("not-a-jwt").is_err());
        assert!(get_jwt_expiration("not-a-jwt").is_none());
        assert!(is_jwt_expired("not-a-jwt"));
    }

    #[test]
    fn test_is_jwt_expiring_soon() {
        let token = test_tokens::access_token(Duration::minutes(3));
        assert!(is_jwt_expiring_soon(&token, Duration::minutes(5)));
        assert!(!is_jwt_expiring_soon(&token, Duration::minutes(1)));
    }

    #[test]
    fn test_session_access_expiry() {
        let session = Session::new(test_tokens::access_token(Duration::hours(1)), None);
        assert!(session.access_expires_at().is_some());
    }
}
