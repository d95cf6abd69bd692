use crate::domain_model::{Identity, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),
    #[error("user not found")]
    UserNotFound,
    #[error("user already exists")]
    UserExists,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        AuthError::Unauthorized(UnauthorizedReason::Token(error))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    MissingToken,
    Token(TokenError),
    UnknownIdentity,
    RefreshTokenMismatch,
    InvalidPassword,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnauthorizedReason::MissingToken => write!(f, "no token presented"),
            UnauthorizedReason::Token(e) => write!(f, "{}", e),
            UnauthorizedReason::UnknownIdentity => write!(f, "token subject no longer exists"),
            UnauthorizedReason::RefreshTokenMismatch => {
                write!(f, "refresh token is stale or already used")
            }
            UnauthorizedReason::InvalidPassword => write!(f, "invalid password"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
    #[error("token signature invalid")]
    BadSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Either `username` or `email` identifies the account; `username` wins when
/// both are given.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub identity: Identity,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken(pub String);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies self-contained tokens. Verification never touches the
/// credential store.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue(&self, kind: TokenKind, user: UserId) -> Result<IssuedToken, AuthError>;
    async fn verify(&self, kind: TokenKind, token: &str) -> Result<UserId, TokenError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    async fn register(&self, request: RegisterInput) -> Result<Identity, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    async fn logout(&self, user_id: UserId) -> Result<(), AuthError>;
    async fn refresh(&self, refresh_token: Option<&str>) -> Result<AuthTokens, AuthError>;
    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError>;
    /// Resolves an access token into the identity it was issued for.
    async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError>;
}
