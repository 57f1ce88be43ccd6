use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{config::JwtConfig, error::ApiError, state::AppState};

/// Access-token lifetime when `JWT_TTL_MINUTES` is not configured.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::minutes(15);

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // username
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    audience: String,
    access_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let access_ttl = match cfg.ttl_minutes {
            Some(minutes) => Duration::minutes(minutes),
            None => {
                warn!(
                    default_minutes = DEFAULT_ACCESS_TTL.whole_minutes(),
                    "JWT_TTL_MINUTES not configured; using default access token lifetime"
                );
                DEFAULT_ACCESS_TTL
            }
        };
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            algorithm: cfg.algorithm,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn sign_access(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, self.access_ttl())
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(subject, ttl, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        subject: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let exp = now + ttl;
        let claims = Claims {
            sub: subject.to_owned(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        debug!(subject, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, OffsetDateTime::now_utc())
    }

    /// Valid while `now <= exp`, with no leeway.
    pub fn verify_at(&self, token: &str, now: OffsetDateTime) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;

        if now.unix_timestamp() > data.claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(subject = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

/// Username of the caller, taken from a valid bearer token.
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                warn!("missing Authorization header");
                credentials_rejected()
            })?;

        let token = bearer_token(auth_header).ok_or_else(|| {
            warn!("Authorization header is not a bearer token");
            credentials_rejected()
        })?;

        let claims = keys.verify(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            credentials_rejected()
        })?;

        Ok(AuthUser(claims.sub))
    }
}

fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn credentials_rejected() -> ApiError {
    ApiError::Unauthorized("Could not validate credentials".into())
}
