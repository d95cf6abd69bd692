use super::util::is_dup_key;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

pub struct MySqlCredentialStore {
    pool: MySqlPool,
}

impl MySqlCredentialStore {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlCredentialStore { pool }
    }

    fn row_to_record(row: MySqlRow) -> Result<CredentialRecord, AuthError> {
        let user_id: UserId = row
            .try_get("user_id")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let username: String = row
            .try_get("username")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let email: String = row
            .try_get("email")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let full_name: String = row
            .try_get("full_name")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let password_hash: String = row
            .try_get("password_hash")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let refresh_token: Option<String> = row
            .try_get("refresh_token")
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(CredentialRecord {
            user_id,
            username,
            email,
            full_name,
            password_hash,
            refresh_token,
            created_at,
        })
    }
}

#[async_trait::async_trait]
impl CredentialStore for MySqlCredentialStore {
    async fn create(&self, record: CredentialRecord) -> Result<(), AuthError> {
        let res = sqlx::query(
            r#"
INSERT INTO user (user_id, username, email, full_name, password_hash, created_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.user_id)
        .bind(&record.username)
        .bind(&record.email)
        .bind(&record.full_name)
        .bind(&record.password_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_dup_key(&e) => Err(AuthError::UserExists),
            Err(e) => Err(AuthError::Store(format!("insert user: {e}"))),
        }
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<CredentialRecord>, AuthError> {
        // NULL never compares equal, so an absent identifier matches nothing
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, username, email, full_name, password_hash, refresh_token, created_at
FROM user
WHERE username = ? OR email = ?
ORDER BY username = ? DESC
LIMIT 1
"#,
        )
        .bind(username)
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("query user: {e}")))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<CredentialRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT user_id, username, email, full_name, password_hash, refresh_token, created_at
FROM user
WHERE user_id = ?
"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("query user: {e}")))?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn set_refresh_token(
        &self,
        user_id: UserId,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        sqlx::query("UPDATE user SET refresh_token = ? WHERE user_id = ?")
            .bind(refresh_token)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuthError::Store(format!("update refresh_token: {e}")))?;

        Ok(())
    }

    async fn swap_refresh_token(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError> {
        // single statement: InnoDB row lock makes compare and write one unit
        let res = sqlx::query(
            r#"
UPDATE user SET refresh_token = ?
WHERE user_id = ? AND refresh_token = ?
"#,
        )
        .bind(new)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("swap refresh_token: {e}")))?;

        Ok(res.rows_affected() == 1)
    }

    async fn swap_password_hash(
        &self,
        user_id: UserId,
        expected: &str,
        new: &str,
    ) -> Result<bool, AuthError> {
        let res = sqlx::query(
            r#"
UPDATE user SET password_hash = ?
WHERE user_id = ? AND password_hash = ?
"#,
        )
        .bind(new)
        .bind(user_id)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(|e| AuthError::Store(format!("swap password_hash: {e}")))?;

        Ok(res.rows_affected() == 1)
    }
}
