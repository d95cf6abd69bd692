use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::Utc;
use std::sync::Arc;

/// Login, logout, refresh-token rotation and password change over a
/// [`CredentialStore`].
///
/// Sessions follow a single-session policy: each user has at most one live
/// refresh token, so logging in elsewhere silently ends the previous session.
/// Access tokens stay valid until they expire; only the refresh path consults
/// stored state.
pub struct RealSessionService {
    credential_store: Arc<dyn CredentialStore>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
}

impl RealSessionService {
    pub fn new(
        credential_store: Arc<dyn CredentialStore>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
    ) -> Self {
        Self {
            credential_store,
            credential_hasher,
            token_codec,
        }
    }

    fn required(field: &str, value: &str) -> Result<(), AuthError> {
        if value.trim().is_empty() {
            return Err(AuthError::BadRequest(format!("{} is required", field)));
        }
        Ok(())
    }

    fn normalize(value: &str) -> String {
        value.trim().to_lowercase()
    }

    fn non_blank(value: Option<String>) -> Option<String> {
        value
            .map(|v| Self::normalize(&v))
            .filter(|v| !v.is_empty())
    }

    async fn issue_pair(&self, user_id: UserId) -> Result<AuthTokens, AuthError> {
        let access = self.token_codec.issue(TokenKind::Access, user_id).await?;
        let refresh = self.token_codec.issue(TokenKind::Refresh, user_id).await?;
        Ok(AuthTokens {
            access_token: AccessToken(access.token),
            refresh_token: RefreshToken(refresh.token),
            access_token_expires_at: access.expires_at,
            refresh_token_expires_at: refresh.expires_at,
        })
    }
}

#[async_trait::async_trait]
impl SessionService for RealSessionService {
    async fn register(&self, request: RegisterInput) -> Result<Identity, AuthError> {
        let RegisterInput {
            full_name,
            email,
            username,
            password,
        } = request;

        Self::required("fullName", &full_name)?;
        Self::required("email", &email)?;
        Self::required("username", &username)?;
        Self::required("password", &password)?;

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let record = CredentialRecord {
            user_id: UserId::new_v4(),
            username: Self::normalize(&username),
            email: Self::normalize(&email),
            full_name: full_name.trim().to_string(),
            password_hash,
            refresh_token: None,
            created_at: Utc::now(),
        };
        let identity = record.identity();
        self.credential_store.create(record).await?;

        info!(user_id = %identity.id, username = %identity.username, "user registered");
        Ok(identity)
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput {
            username,
            email,
            password,
        } = request;

        let username = Self::non_blank(username);
        let email = Self::non_blank(email);
        if username.is_none() && email.is_none() {
            return Err(AuthError::BadRequest(
                "username or email is required".to_string(),
            ));
        }

        let rec = self
            .credential_store
            .find_by_username_or_email(username.as_deref(), email.as_deref())
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let ok = self
            .credential_hasher
            .verify_password(&password, &rec.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::Unauthorized(UnauthorizedReason::InvalidPassword));
        }

        let tokens = self.issue_pair(rec.user_id).await?;

        // overwrites whatever session this user had before
        self.credential_store
            .set_refresh_token(rec.user_id, Some(&tokens.refresh_token.0))
            .await?;

        info!(user_id = %rec.user_id, "user logged in");
        Ok(LoginResult {
            identity: rec.identity(),
            tokens,
        })
    }

    async fn logout(&self, user_id: UserId) -> Result<(), AuthError> {
        self.credential_store
            .set_refresh_token(user_id, None)
            .await?;

        info!(%user_id, "user logged out");
        Ok(())
    }

    async fn refresh(&self, refresh_token: Option<&str>) -> Result<AuthTokens, AuthError> {
        let presented = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized(UnauthorizedReason::MissingToken))?;

        let user_id = self
            .token_codec
            .verify(TokenKind::Refresh, presented)
            .await?;

        let rec = self
            .credential_store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity))?;

        if rec.refresh_token.as_deref() != Some(presented) {
            warn!(%user_id, "refresh token reuse or stale session");
            return Err(AuthError::Unauthorized(
                UnauthorizedReason::RefreshTokenMismatch,
            ));
        }

        let tokens = self.issue_pair(user_id).await?;

        // Rotation: the swap is the authoritative check; the comparison above
        // only avoids signing tokens for a request that cannot win.
        let swapped = self
            .credential_store
            .swap_refresh_token(user_id, presented, &tokens.refresh_token.0)
            .await?;
        if !swapped {
            warn!(%user_id, "lost refresh rotation race");
            return Err(AuthError::Unauthorized(
                UnauthorizedReason::RefreshTokenMismatch,
            ));
        }

        info!(%user_id, "refresh token rotated");
        Ok(tokens)
    }

    async fn change_password(
        &self,
        user_id: UserId,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        Self::required("newPassword", new_password)?;

        let rec = self
            .credential_store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let ok = self
            .credential_hasher
            .verify_password(old_password, &rec.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::Unauthorized(UnauthorizedReason::InvalidPassword));
        }

        let new_hash = self.credential_hasher.hash_password(new_password).await?;
        let swapped = self
            .credential_store
            .swap_password_hash(user_id, &rec.password_hash, &new_hash)
            .await?;
        if !swapped {
            // a concurrent change replaced the hash the old password matched
            return Err(AuthError::Unauthorized(UnauthorizedReason::InvalidPassword));
        }

        // TODO: decide with product whether a password change should also end
        // the current session; today existing tokens stay valid.
        info!(%user_id, "password changed");
        Ok(())
    }

    async fn authenticate(&self, access_token: &str) -> Result<Identity, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::Unauthorized(UnauthorizedReason::MissingToken));
        }

        let user_id = self
            .token_codec
            .verify(TokenKind::Access, access_token)
            .await?;

        let rec = self
            .credential_store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity))?;

        Ok(rec.identity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{JwtHs256Codec, cheap_hasher, test_config};
    use crate::infra_memory::MemoryCredentialStore;

    struct Fixture {
        service: Arc<RealSessionService>,
        store: Arc<MemoryCredentialStore>,
        codec: Arc<JwtHs256Codec>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryCredentialStore::new());
        let codec = Arc::new(JwtHs256Codec::new(test_config()));
        let service = Arc::new(RealSessionService::new(
            store.clone(),
            Arc::new(cheap_hasher()),
            codec.clone(),
        ));
        Fixture {
            service,
            store,
            codec,
        }
    }

    async fn register(service: &RealSessionService, username: &str, password: &str) -> Identity {
        service
            .register(RegisterInput {
                full_name: "Test User".to_string(),
                email: format!("{}@example.com", username.trim()),
                username: username.to_string(),
                password: password.to_string(),
            })
            .await
            .unwrap()
    }

    fn login_input(username: &str, password: &str) -> LoginInput {
        LoginInput {
            username: Some(username.to_string()),
            email: None,
            password: password.to_string(),
        }
    }

    async fn stored_refresh(store: &MemoryCredentialStore, user_id: UserId) -> Option<String> {
        store
            .find_by_id(user_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token
    }

    #[tokio::test]
    async fn register_normalizes_and_rejects_duplicates() {
        let f = fixture();
        let identity = register(&f.service, "  Alice ", "pw-alice").await;
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.email, "alice@example.com");

        let dup = f
            .service
            .register(RegisterInput {
                full_name: "Other".to_string(),
                email: "other@example.com".to_string(),
                username: "ALICE".to_string(),
                password: "pw".to_string(),
            })
            .await;
        assert!(matches!(dup, Err(AuthError::UserExists)));
    }

    #[tokio::test]
    async fn register_requires_every_field() {
        let f = fixture();
        let result = f
            .service
            .register(RegisterInput {
                full_name: "Bob".to_string(),
                email: "bob@example.com".to_string(),
                username: "bob".to_string(),
                password: "   ".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AuthError::BadRequest(m)) if m.contains("password")));
    }

    #[tokio::test]
    async fn login_persists_refresh_token_and_overwrites_previous() {
        let f = fixture();
        let identity = register(&f.service, "alice", "pw-alice").await;

        let first = f.service.login(login_input("alice", "pw-alice")).await.unwrap();
        assert_eq!(first.identity, identity);
        assert_eq!(
            stored_refresh(&f.store, identity.id).await,
            Some(first.tokens.refresh_token.0.clone())
        );

        let second = f.service.login(login_input("alice", "pw-alice")).await.unwrap();
        assert_eq!(
            stored_refresh(&f.store, identity.id).await,
            Some(second.tokens.refresh_token.0.clone())
        );

        // the first device's session is gone
        let stale = f
            .service
            .refresh(Some(&first.tokens.refresh_token.0))
            .await;
        assert!(matches!(
            stale,
            Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenMismatch))
        ));
    }

    #[tokio::test]
    async fn login_by_email_and_case_insensitive_username() {
        let f = fixture();
        register(&f.service, "carol", "pw-carol").await;

        let by_email = LoginInput {
            username: None,
            email: Some("Carol@Example.com".to_string()),
            password: "pw-carol".to_string(),
        };
        assert!(f.service.login(by_email).await.is_ok());
        assert!(f.service.login(login_input("CAROL", "pw-carol")).await.is_ok());
    }

    #[tokio::test]
    async fn login_failures() {
        let f = fixture();
        register(&f.service, "dave", "pw-dave").await;

        let missing = LoginInput {
            username: Some(" ".to_string()),
            email: None,
            password: "pw-dave".to_string(),
        };
        assert!(matches!(
            f.service.login(missing).await,
            Err(AuthError::BadRequest(_))
        ));
        assert!(matches!(
            f.service.login(login_input("nobody", "pw")).await,
            Err(AuthError::UserNotFound)
        ));
        assert!(matches!(
            f.service.login(login_input("dave", "wrong")).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::InvalidPassword))
        ));
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_reuse() {
        let f = fixture();
        let identity = register(&f.service, "u1", "pw-u1").await;

        let login = f.service.login(login_input("u1", "pw-u1")).await.unwrap();
        let r1 = login.tokens.refresh_token.0.clone();

        let second = f.service.refresh(Some(&r1)).await.unwrap();
        let r2 = second.refresh_token.0.clone();
        assert_ne!(r1, r2);
        assert_ne!(second.access_token, login.tokens.access_token);
        assert_eq!(stored_refresh(&f.store, identity.id).await, Some(r2.clone()));

        assert!(matches!(
            f.service.refresh(Some(&r1)).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenMismatch))
        ));

        let third = f.service.refresh(Some(&r2)).await.unwrap();
        assert_ne!(third.refresh_token.0, r2);
        assert_eq!(
            stored_refresh(&f.store, identity.id).await,
            Some(third.refresh_token.0.clone())
        );
    }

    #[tokio::test]
    async fn refresh_rejects_missing_and_invalid_tokens() {
        let f = fixture();
        assert!(matches!(
            f.service.refresh(None).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::MissingToken))
        ));
        assert!(matches!(
            f.service.refresh(Some("garbage")).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::Token(
                TokenError::Malformed
            )))
        ));

        // well signed, but the subject was never registered
        let orphan = f
            .codec
            .issue(TokenKind::Refresh, UserId::new_v4())
            .await
            .unwrap();
        assert!(matches!(
            f.service.refresh(Some(&orphan.token)).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity))
        ));
    }

    #[tokio::test]
    async fn access_token_cannot_refresh() {
        let f = fixture();
        register(&f.service, "erin", "pw-erin").await;
        let login = f.service.login(login_input("erin", "pw-erin")).await.unwrap();

        let result = f.service.refresh(Some(&login.tokens.access_token.0)).await;
        assert!(matches!(
            result,
            Err(AuthError::Unauthorized(UnauthorizedReason::Token(
                TokenError::BadSignature
            )))
        ));
    }

    #[tokio::test]
    async fn logout_then_refresh_fails() {
        let f = fixture();
        let identity = register(&f.service, "frank", "pw-frank").await;
        let login = f.service.login(login_input("frank", "pw-frank")).await.unwrap();

        f.service.logout(identity.id).await.unwrap();
        assert_eq!(stored_refresh(&f.store, identity.id).await, None);
        // idempotent
        f.service.logout(identity.id).await.unwrap();

        assert!(matches!(
            f.service.refresh(Some(&login.tokens.refresh_token.0)).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::RefreshTokenMismatch))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_refresh_has_exactly_one_winner() {
        let f = fixture();
        let identity = register(&f.service, "grace", "pw-grace").await;
        let login = f.service.login(login_input("grace", "pw-grace")).await.unwrap();
        let r1 = login.tokens.refresh_token.0;

        for _ in 0..10 {
            let current = stored_refresh(&f.store, identity.id).await.unwrap();
            let (a, b) = tokio::join!(
                {
                    let service = f.service.clone();
                    let token = current.clone();
                    tokio::spawn(async move { service.refresh(Some(&token)).await })
                },
                {
                    let service = f.service.clone();
                    let token = current.clone();
                    tokio::spawn(async move { service.refresh(Some(&token)).await })
                }
            );
            let (a, b) = (a.unwrap(), b.unwrap());
            assert!(a.is_ok() != b.is_ok(), "exactly one refresh must win");

            let winner = a.or(b).unwrap();
            assert_eq!(
                stored_refresh(&f.store, identity.id).await,
                Some(winner.refresh_token.0)
            );
        }

        assert!(f.service.refresh(Some(&r1)).await.is_err());
    }

    #[tokio::test]
    async fn change_password() {
        let f = fixture();
        let identity = register(&f.service, "heidi", "old-pw").await;
        let before = f.store.find_by_id(identity.id).await.unwrap().unwrap();

        let wrong = f
            .service
            .change_password(identity.id, "not-old", "new-pw")
            .await;
        assert!(matches!(
            wrong,
            Err(AuthError::Unauthorized(UnauthorizedReason::InvalidPassword))
        ));
        let unchanged = f.store.find_by_id(identity.id).await.unwrap().unwrap();
        assert_eq!(unchanged.password_hash, before.password_hash);

        f.service
            .change_password(identity.id, "old-pw", "new-pw")
            .await
            .unwrap();
        assert!(f.service.login(login_input("heidi", "old-pw")).await.is_err());
        assert!(f.service.login(login_input("heidi", "new-pw")).await.is_ok());
    }

    #[tokio::test]
    async fn change_password_keeps_existing_session() {
        let f = fixture();
        let identity = register(&f.service, "ivan", "old-pw").await;
        let login = f.service.login(login_input("ivan", "old-pw")).await.unwrap();

        f.service
            .change_password(identity.id, "old-pw", "new-pw")
            .await
            .unwrap();

        assert!(f.service.authenticate(&login.tokens.access_token.0).await.is_ok());
        assert!(f
            .service
            .refresh(Some(&login.tokens.refresh_token.0))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn authenticate_resolves_identity_without_session_state() {
        let f = fixture();
        let identity = register(&f.service, "judy", "pw-judy").await;
        let login = f.service.login(login_input("judy", "pw-judy")).await.unwrap();

        f.service.logout(identity.id).await.unwrap();
        // access tokens are self-contained and survive logout until expiry
        let resolved = f
            .service
            .authenticate(&login.tokens.access_token.0)
            .await
            .unwrap();
        assert_eq!(resolved, identity);
    }

    #[tokio::test]
    async fn authenticate_rejects_expired_and_orphaned_tokens() {
        let f = fixture();
        let identity = register(&f.service, "mallory", "pw").await;

        let expired = f
            .codec
            .issue_at(
                TokenKind::Access,
                identity.id,
                Utc::now() - chrono::Duration::hours(2),
            )
            .unwrap();
        assert!(matches!(
            f.service.authenticate(&expired.token).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::Token(
                TokenError::Expired
            )))
        ));

        let orphan = f
            .codec
            .issue(TokenKind::Access, UserId::new_v4())
            .await
            .unwrap();
        assert!(matches!(
            f.service.authenticate(&orphan.token).await,
            Err(AuthError::Unauthorized(UnauthorizedReason::UnknownIdentity))
        ));
    }
}
