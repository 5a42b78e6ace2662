//! Postgres-backed [`AuthStore`].
//!
//! Uniqueness of `email`, `google_id`, and `discord_id` is enforced by the
//! schema; unique violations surface as [`StoreError::Duplicate`] so the
//! core can translate them. Every query runs inside a `db.query` span.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info_span, Instrument};

use super::provider::IdentityProvider;
use super::roles::RoleType;
use super::store::{
    AuthStore, NewUser, ProviderType, SessionRecord, StoreError, UserPatch, UserRecord,
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, password_hash, user_type, \
                            is_active, google_id, discord_id, picture";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// SQLSTATE 23505, the unique-constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "23505")
}

fn translate(err: sqlx::Error, context: &'static str) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Duplicate
    } else {
        StoreError::Other(anyhow::Error::new(err).context(context))
    }
}

fn map_user(row: &PgRow) -> Result<UserRecord, StoreError> {
    let record = UserRecord {
        id: row.try_get("id").context("users.id")?,
        first_name: row.try_get("first_name").context("users.first_name")?,
        last_name: row.try_get("last_name").context("users.last_name")?,
        email: row.try_get("email").context("users.email")?,
        password_hash: row.try_get("password_hash").context("users.password_hash")?,
        user_type: row.try_get("user_type").context("users.user_type")?,
        is_active: row.try_get("is_active").context("users.is_active")?,
        google_id: row.try_get("google_id").context("users.google_id")?,
        discord_id: row.try_get("discord_id").context("users.discord_id")?,
        picture: row.try_get("picture").context("users.picture")?,
    };
    Ok(record)
}

fn parse_provider(value: &str) -> Result<ProviderType, StoreError> {
    match value {
        "credentials" => Ok(ProviderType::Credentials),
        "google" => Ok(ProviderType::Google),
        "discord" => Ok(ProviderType::Discord),
        other => Err(StoreError::Other(anyhow::anyhow!(
            "unknown provider in sessions.provider: {other}"
        ))),
    }
}

fn map_session(row: &PgRow) -> Result<SessionRecord, StoreError> {
    let provider: String = row.try_get("provider").context("sessions.provider")?;
    let record = SessionRecord {
        id: row.try_get("id").context("sessions.id")?,
        user_id: row.try_get("user_id").context("sessions.user_id")?,
        expires_at: row.try_get("expires_at").context("sessions.expires_at")?,
        user_agent: row.try_get("user_agent").context("sessions.user_agent")?,
        ip_address: row.try_get("ip_address").context("sessions.ip_address")?,
        provider: parse_provider(&provider)?,
    };
    Ok(record)
}

fn provider_column(provider: IdentityProvider) -> &'static str {
    match provider {
        IdentityProvider::Google => "google_id",
        IdentityProvider::Discord => "discord_id",
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = info_span!("db.query", db.system = "postgresql", db.statement = %query);
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to query user by email"))?;
        row.as_ref().map(map_user).transpose()
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = info_span!("db.query", db.system = "postgresql", db.statement = %query);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to query user by id"))?;
        row.as_ref().map(map_user).transpose()
    }

    async fn find_user_by_provider(
        &self,
        provider: IdentityProvider,
        provider_id: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let column = provider_column(provider);
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let span = info_span!("db.query", db.system = "postgresql", db.statement = %query);
        let row = sqlx::query(&query)
            .bind(provider_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to query user by provider id"))?;
        row.as_ref().map(map_user).transpose()
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let query = format!(
            "INSERT INTO users \
             (first_name, last_name, email, password_hash, user_type, is_active, \
              google_id, discord_id, picture) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {USER_COLUMNS}"
        );
        let span = info_span!("db.query", db.system = "postgresql", db.statement = %query);
        let row = sqlx::query(&query)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.user_type)
            .bind(user.is_active)
            .bind(&user.google_id)
            .bind(&user.discord_id)
            .bind(&user.picture)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to insert user"))?;
        map_user(&row)
    }

    async fn update_user(&self, id: i64, patch: UserPatch) -> Result<(), StoreError> {
        let query = "UPDATE users SET \
                     first_name = COALESCE($2, first_name), \
                     last_name = COALESCE($3, last_name), \
                     password_hash = COALESCE($4, password_hash), \
                     is_active = COALESCE($5, is_active), \
                     google_id = COALESCE($6, google_id), \
                     discord_id = COALESCE($7, discord_id), \
                     picture = COALESCE($8, picture), \
                     updated_at = NOW() \
                     WHERE id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(&patch.first_name)
            .bind(&patch.last_name)
            .bind(&patch.password_hash)
            .bind(patch.is_active)
            .bind(&patch.google_id)
            .bind(&patch.discord_id)
            .bind(&patch.picture)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to update user"))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Other(anyhow::anyhow!("no such user: {id}")));
        }
        Ok(())
    }

    async fn insert_session(&self, session: SessionRecord) -> Result<(), StoreError> {
        let query = "INSERT INTO sessions \
                     (id, user_id, expires_at, user_agent, ip_address, provider) \
                     VALUES ($1, $2, $3, $4, $5, $6)";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        sqlx::query(query)
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(&session.user_agent)
            .bind(&session.ip_address)
            .bind(session.provider.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to insert session"))?;
        Ok(())
    }

    async fn find_session(
        &self,
        session_id: &[u8],
    ) -> Result<Option<(SessionRecord, UserRecord)>, StoreError> {
        let query =
            "SELECT s.id, s.user_id, s.expires_at, s.user_agent, s.ip_address, s.provider, \
             u.id AS u_id, u.first_name, u.last_name, u.email, u.password_hash, u.user_type, \
             u.is_active, u.google_id, u.discord_id, u.picture \
             FROM sessions s JOIN users u ON u.id = s.user_id WHERE s.id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        let Some(row) = sqlx::query(query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to query session"))?
        else {
            return Ok(None);
        };

        let session = map_session(&row)?;
        let user = UserRecord {
            id: row.try_get("u_id").context("users.id")?,
            first_name: row.try_get("first_name").context("users.first_name")?,
            last_name: row.try_get("last_name").context("users.last_name")?,
            email: row.try_get("email").context("users.email")?,
            password_hash: row.try_get("password_hash").context("users.password_hash")?,
            user_type: row.try_get("user_type").context("users.user_type")?,
            is_active: row.try_get("is_active").context("users.is_active")?,
            google_id: row.try_get("google_id").context("users.google_id")?,
            discord_id: row.try_get("discord_id").context("users.discord_id")?,
            picture: row.try_get("picture").context("users.picture")?,
        };
        Ok(Some((session, user)))
    }

    async fn update_session_expiry(
        &self,
        session_id: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = "UPDATE sessions SET expires_at = $2 WHERE id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        sqlx::query(query)
            .bind(session_id)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to update session expiry"))?;
        Ok(())
    }

    async fn delete_session(&self, session_id: &[u8]) -> Result<(), StoreError> {
        let query = "DELETE FROM sessions WHERE id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        sqlx::query(query)
            .bind(session_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to delete session"))?;
        Ok(())
    }

    async fn delete_sessions_by_user(&self, user_id: i64) -> Result<u64, StoreError> {
        let query = "DELETE FROM sessions WHERE user_id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to delete user sessions"))?;
        Ok(result.rows_affected())
    }

    async fn roles_for_user(&self, user_id: i64) -> Result<Vec<RoleType>, StoreError> {
        let query = "SELECT r.name FROM roles r \
                     JOIN user_roles ur ON ur.role_id = r.id \
                     WHERE ur.user_id = $1";
        let span = info_span!("db.query", db.system = "postgresql", db.statement = query);
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .map_err(|err| translate(err, "failed to query roles"))?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get("name").context("roles.name")?;
            let role = name
                .parse::<RoleType>()
                .map_err(|err| StoreError::Other(anyhow::anyhow!(err)))?;
            roles.push(role);
        }
        Ok(roles)
    }
}
