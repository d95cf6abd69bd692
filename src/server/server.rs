use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::logger::*;
use crate::settings::{self, Settings};
use anyhow::anyhow;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

/// How session cookies are stamped onto responses.
#[derive(Debug, Clone)]
pub struct CookiePolicy {
    pub secure: bool,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

pub struct Server {
    pub session_service: Arc<dyn SessionService>,
    pub cookie_policy: CookiePolicy,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub fn new(session_service: Arc<dyn SessionService>, cookie_policy: CookiePolicy) -> Self {
        Self {
            session_service,
            cookie_policy,
            pool: None,
        }
    }

    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let jwt_config = jwt_config(&settings.auth)?;
        let cookie_policy = CookiePolicy {
            secure: settings.cookie.secure,
            access_ttl: jwt_config.access.ttl,
            refresh_ttl: jwt_config.refresh.ttl,
        };

        let mut pool = None;
        let credential_store: Arc<dyn CredentialStore> = match settings.store.backend.as_str() {
            "memory" => {
                warn!("using in-memory credential store, data is lost on restart");
                Arc::new(MemoryCredentialStore::new())
            }
            "mysql" => {
                let dsn = settings
                    .store
                    .mysql_dsn
                    .as_deref()
                    .ok_or_else(|| anyhow!("store.mysql_dsn is required for mysql backend"))?;
                let mysql = Pool::<MySql>::connect(dsn).await?;
                pool = Some(mysql.clone());
                Arc::new(MySqlCredentialStore::new(mysql))
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher::new());
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(jwt_config));

        let session_service: Arc<dyn SessionService> = Arc::new(RealSessionService::new(
            credential_store,
            credential_hasher,
            token_codec,
        ));

        info!("server started");

        Ok(Self {
            session_service,
            cookie_policy,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}

const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Build the signing configuration, refusing setups where one secret could
/// verify the other kind of token.
pub fn jwt_config(auth: &settings::Auth) -> anyhow::Result<JwtConfig> {
    if auth.access_token_secret.is_empty() || auth.refresh_token_secret.is_empty() {
        return Err(anyhow!("access and refresh token secrets must be set"));
    }
    if auth.access_token_secret == auth.refresh_token_secret {
        return Err(anyhow!("access and refresh token secrets must differ"));
    }
    if auth.access_token_ttl_secs == 0 || auth.refresh_token_ttl_secs == 0 {
        return Err(anyhow!("token lifetimes must be positive"));
    }
    if auth.access_token_ttl_secs > MAX_TOKEN_TTL_SECS
        || auth.refresh_token_ttl_secs > MAX_TOKEN_TTL_SECS
    {
        return Err(anyhow!(
            "token lifetimes must not exceed {} seconds",
            MAX_TOKEN_TTL_SECS
        ));
    }

    Ok(JwtConfig {
        issuer: auth.issuer.clone(),
        audience: auth.audience.clone(),
        access: TokenKeyConfig {
            secret: auth.access_token_secret.clone().into_bytes(),
            ttl: Duration::from_secs(auth.access_token_ttl_secs),
        },
        refresh: TokenKeyConfig {
            secret: auth.refresh_token_secret.clone().into_bytes(),
            ttl: Duration::from_secs(auth.refresh_token_ttl_secs),
        },
    })
}
