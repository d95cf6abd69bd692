use crate::application_port::*;
use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TokenKeyConfig {
    pub secret: Vec<u8>,
    pub ttl: Duration,
}

/// Process-wide signing configuration, built once at startup and read-only
/// afterwards.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access: TokenKeyConfig,
    pub refresh: TokenKeyConfig,
}

impl JwtConfig {
    fn key(&self, kind: TokenKind) -> &TokenKeyConfig {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String, // user id as string
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // keeps two tokens issued in the same second distinct
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    pub fn ttl(&self, kind: TokenKind) -> Duration {
        self.cfg.key(kind).ttl
    }

    /// Issue a token as if it had been signed at `issued_at`.
    pub fn issue_at(
        &self,
        kind: TokenKind,
        user: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, AuthError> {
        let key = self.cfg.key(kind);
        let ttl = chrono::Duration::from_std(key.ttl)
            .map_err(|e| AuthError::InternalError(e.to_string()))?;
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::InternalError("token expiry out of range".to_string()))?;
        let claims = Claims {
            sub: user.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&key.secret),
        )
        .map_err(|e| AuthError::InternalError(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    fn decode_claims(&self, kind: TokenKind, token: &str) -> Result<Claims, TokenError> {
        let mut v = Validation::new(Algorithm::HS256);
        // expiry is checked below without leeway
        v.validate_exp = false;
        v.set_audience(&[self.cfg.audience.clone()]);
        v.set_issuer(&[self.cfg.issuer.clone()]);
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.cfg.key(kind).secret),
            &v,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })?;
        Ok(data.claims)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue(&self, kind: TokenKind, user: UserId) -> Result<IssuedToken, AuthError> {
        self.issue_at(kind, user, Utc::now())
    }

    async fn verify(&self, kind: TokenKind, token: &str) -> Result<UserId, TokenError> {
        let claims = self.decode_claims(kind, token)?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        claims.sub.parse::<UserId>().map_err(|_| TokenError::Malformed)
    }
}
