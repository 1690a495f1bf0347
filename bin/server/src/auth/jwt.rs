//! Bearer JWT validation.

use jsonwebtoken::{Validation, decode, decode_header};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

use super::jwks::JwksCache;

/// The `aud` claim, which may be a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(aud) => aud == value,
            Self::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// Claims of a validated access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iss: String,
    #[serde(default)]
    pub aud: Option<Audience>,
    pub exp: u64,
    /// Set by the issuer for client-credentials tokens.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Grant type.
    #[serde(default)]
    pub gty: Option<String>,
    /// Permission grants. Absent means the token carries no authorization
    /// at all, which is distinct from an empty list.
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

/// Why a token was rejected. Callers only ever see "invalid token".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// The token header could not be decoded.
    Malformed { details: String },
    /// The header names no `kid`.
    MissingKeyId,
    /// The signing key could not be found.
    KeyLookup { details: String },
    /// The header's algorithm differs from the key's.
    AlgorithmMismatch { kid: String },
    /// Signature, expiry, issuer or claim shape check failed.
    Invalid { details: String },
    /// Neither `client_id` nor `aud` names an accepted client.
    ClientNotAllowed,
}

impl fmt::Display for JwtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { details } => write!(f, "malformed token: {details}"),
            Self::MissingKeyId => write!(f, "token header has no kid"),
            Self::KeyLookup { details } => write!(f, "signing key lookup failed: {details}"),
            Self::AlgorithmMismatch { kid } => {
                write!(f, "token algorithm does not match key '{kid}'")
            }
            Self::Invalid { details } => write!(f, "token rejected: {details}"),
            Self::ClientNotAllowed => write!(f, "token was not issued to an accepted client"),
        }
    }
}

impl std::error::Error for JwtError {}

/// Returns true if `token` has the three dot-separated segments of a
/// compact JWS.
#[must_use]
pub fn looks_like_jwt(token: &str) -> bool {
    let mut segments = 0;
    for segment in token.split('.') {
        if segment.is_empty() {
            return false;
        }
        segments += 1;
    }
    segments == 3
}

/// Validates tokens against the issuer's keys.
pub struct JwtValidator {
    keys: Arc<JwksCache>,
    issuer: String,
    client_ids: Vec<String>,
}

impl JwtValidator {
    #[must_use]
    pub fn new(keys: Arc<JwksCache>, issuer: String, client_ids: Vec<String>) -> Self {
        Self {
            keys,
            issuer,
            client_ids,
        }
    }

    /// Verifies the signature, `exp` and `iss`, then requires `client_id`
    /// or `aud` to name an accepted client.
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &str) -> Result<TokenClaims, Report<JwtError>> {
        let header = decode_header(token).map_err(|e| JwtError::Malformed {
            details: e.to_string(),
        })?;
        let kid = header.kid.ok_or(JwtError::MissingKeyId)?;

        let signing_key = self
            .keys
            .signing_key(&kid)
            .await
            .map_err(|e| JwtError::KeyLookup {
                details: e.to_string(),
            })?;
        let algorithm = signing_key.algorithm.unwrap_or(header.alg);
        if algorithm != header.alg {
            return Err(JwtError::AlgorithmMismatch { kid }.into());
        }

        let mut validation = Validation::new(algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audience is checked below together with client_id.
        validation.validate_aud = false;

        let claims = decode::<TokenClaims>(token, &signing_key.key, &validation)
            .map_err(|e| JwtError::Invalid {
                details: e.to_string(),
            })?
            .claims;

        if !self.is_accepted_client(&claims) {
            return Err(JwtError::ClientNotAllowed.into());
        }
        Ok(claims)
    }

    fn is_accepted_client(&self, claims: &TokenClaims) -> bool {
        let by_client_id = claims
            .client_id
            .as_deref()
            .is_some_and(|id| self.client_ids.iter().any(|c| c == id));
        by_client_id
            || claims
                .aud
                .as_ref()
                .is_some_and(|aud| self.client_ids.iter().any(|c| aud.contains(c)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::jwks::tests::{JWKS_PATH, TEST_KID, TEST_SECRET, serve_jwks};
    use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
    use wiremock::MockServer;

    pub(crate) const TEST_CLIENT_ID: &str = "admin-cli";

    /// Signs `claims` with the test key.
    pub(crate) fn sign(claims: &serde_json::Value, kid: &str) -> String {
        let header = Header {
            kid: Some(kid.to_string()),
            ..Header::new(Algorithm::HS256)
        };
        encode(&header, claims, &EncodingKey::from_secret(TEST_SECRET)).expect("sign")
    }

    pub(crate) fn claims_for(issuer: &str, permissions: &[&str]) -> serde_json::Value {
        serde_json::json!({
            "sub": "auth0|alice",
            "iss": issuer,
            "aud": [TEST_CLIENT_ID],
            "exp": chrono::Utc::now().timestamp() + 600,
            "permissions": permissions,
        })
    }

    async fn validator() -> (MockServer, JwtValidator) {
        let server = MockServer::start().await;
        serve_jwks(&server, &[TEST_KID]).await;
        let keys = Arc::new(JwksCache::new(format!("{}{JWKS_PATH}", server.uri())).expect("client"));
        let validator = JwtValidator::new(keys, server.uri(), vec![TEST_CLIENT_ID.to_string()]);
        (server, validator)
    }

    #[test]
    fn jwt_shape_detection() {
        assert!(looks_like_jwt("aaa.bbb.ccc"));
        assert!(!looks_like_jwt("aaa.bbb"));
        assert!(!looks_like_jwt("aaa..ccc"));
        assert!(!looks_like_jwt(&"ab".repeat(32)));
    }

    #[test]
    fn audience_accepts_string_or_list() {
        let one: Audience = serde_json::from_str("\"web\"").expect("string");
        let many: Audience = serde_json::from_str("[\"cli\", \"web\"]").expect("list");
        assert!(one.contains("web"));
        assert!(many.contains("cli"));
        assert!(!many.contains("other"));
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let (server, validator) = validator().await;
        let token = sign(&claims_for(&server.uri(), &["project:foo:read"]), TEST_KID);

        let claims = validator.validate(&token).await.expect("valid");
        assert_eq!(claims.sub, "auth0|alice");
        assert_eq!(
            claims.permissions,
            Some(vec!["project:foo:read".to_string()])
        );
    }

    #[tokio::test]
    async fn client_id_claim_is_accepted_without_audience() {
        let (server, validator) = validator().await;
        let mut claims = claims_for(&server.uri(), &[]);
        claims["aud"] = serde_json::json!("https://api.example.com");
        claims["client_id"] = serde_json::json!(TEST_CLIENT_ID);
        claims["gty"] = serde_json::json!("client-credentials");

        let claims = validator
            .validate(&sign(&claims, TEST_KID))
            .await
            .expect("valid");
        assert_eq!(claims.gty.as_deref(), Some("client-credentials"));
    }

    #[tokio::test]
    async fn tokens_for_other_clients_are_rejected() {
        let (server, validator) = validator().await;
        let mut claims = claims_for(&server.uri(), &[]);
        claims["aud"] = serde_json::json!(["someone-else"]);

        let err = validator
            .validate(&sign(&claims, TEST_KID))
            .await
            .err()
            .expect("rejected");
        assert!(err.to_string().contains("accepted client"));
    }

    #[tokio::test]
    async fn expired_tokens_are_rejected() {
        let (server, validator) = validator().await;
        let mut claims = claims_for(&server.uri(), &[]);
        claims["exp"] = serde_json::json!(chrono::Utc::now().timestamp() - 3600);

        assert!(validator.validate(&sign(&claims, TEST_KID)).await.is_err());
    }

    #[tokio::test]
    async fn wrong_issuer_is_rejected() {
        let (_server, validator) = validator().await;
        let claims = claims_for("https://evil.example.com", &[]);
        assert!(validator.validate(&sign(&claims, TEST_KID)).await.is_err());
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let (server, validator) = validator().await;
        let token = sign(&claims_for(&server.uri(), &[]), "not-published");
        let err = validator.validate(&token).await.err().expect("rejected");
        assert!(err.to_string().contains("not-published"));
    }

    #[tokio::test]
    async fn permissions_of_the_wrong_shape_are_rejected() {
        let (server, validator) = validator().await;
        let mut claims = claims_for(&server.uri(), &[]);
        claims["permissions"] = serde_json::json!("project:foo:read");
        assert!(validator.validate(&sign(&claims, TEST_KID)).await.is_err());
    }
}
