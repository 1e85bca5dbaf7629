//! Bearer token verification.
//!
//! Tokens are HS256 JWTs whose `sub` claim is the numeric user id. The server only
//! verifies; `issue` exists for the `issue-token` command and tests.

use std::time::Duration;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::AuthSettings;
use crate::domain::entities::UserId;

use super::error::InfraError;

/// Identity attached to authenticated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("token rejected: {0}")]
    Invalid(String),
    #[error("token subject `{0}` is not a user id")]
    Subject(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    default_ttl: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &[u8], issuer: impl Into<String>, default_ttl: Duration) -> Self {
        let issuer = issuer.into();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            issuer,
            default_ttl,
        }
    }

    pub fn from_settings(settings: &AuthSettings) -> Result<Self, InfraError> {
        let secret = settings
            .token_secret
            .as_deref()
            .ok_or_else(|| InfraError::configuration("auth.token_secret is not configured"))?;
        Ok(Self::new(
            secret.as_bytes(),
            settings.token_issuer.clone(),
            settings.token_ttl,
        ))
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(err.to_string()),
            }
        })?;

        let user_id: UserId = data
            .claims
            .sub
            .parse()
            .map_err(|_| AuthError::Subject(data.claims.sub.clone()))?;
        if user_id <= 0 {
            return Err(AuthError::Subject(data.claims.sub));
        }
        Ok(Principal { user_id })
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, AuthError> {
        self.issue_at(user_id, OffsetDateTime::now_utc(), self.default_ttl)
    }

    pub fn issue_at(
        &self,
        user_id: UserId,
        issued_at: OffsetDateTime,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let iat = issued_at.unix_timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user_id.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp: iat.saturating_add(ttl_secs),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }
}
