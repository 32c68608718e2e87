// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Refresh token storage: creation, validation, rotation, revocation

use super::Database;
use crate::models::RefreshToken;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_refresh_tokens(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                id TEXT PRIMARY KEY,
                token_hash TEXT UNIQUE NOT NULL,
                user_id TEXT NOT NULL,
                client_id TEXT NOT NULL,
                scope TEXT NOT NULL,
                user_agent TEXT,
                ip_address TEXT,
                expires_at TEXT NOT NULL,
                revoked_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user_client ON refresh_tokens(user_id, client_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a new refresh token row (by digest)
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn store_refresh_token(&self, token: &RefreshToken) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO refresh_tokens (id, token_hash, user_id, client_id, scope, user_agent,
                                        ip_address, expires_at, revoked_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(token.id.to_string())
        .bind(&token.token_hash)
        .bind(token.user_id.to_string())
        .bind(&token.client_id)
        .bind(&token.scope)
        .bind(&token.user_agent)
        .bind(&token.ip_address)
        .bind(token.expires_at)
        .bind(token.revoked_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a refresh token row by digest, revoked or not
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn get_refresh_token(&self, token_hash: &str) -> Result<Option<RefreshToken>> {
        let row = sqlx::query("SELECT * FROM refresh_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_refresh_token(&r)).transpose()
    }

    /// Revoke a single token by digest; no-op for unknown or already revoked
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn revoke_refresh_token(
        &self,
        token_hash: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE token_hash = ? AND revoked_at IS NULL",
        )
        .bind(revoked_at)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Rotate a refresh token: revoke the old row and insert the new one in a
    /// single transaction
    ///
    /// Returns false without inserting if the old token was already revoked,
    /// so a concurrent reader can never observe both tokens valid.
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn rotate_refresh_token(
        &self,
        old_id: Uuid,
        new_token: &RefreshToken,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL",
        )
        .bind(revoked_at)
        .bind(old_id.to_string())
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r"
            INSERT INTO refresh_tokens (id, token_hash, user_id, client_id, scope, user_agent,
                                        ip_address, expires_at, revoked_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(new_token.id.to_string())
        .bind(&new_token.token_hash)
        .bind(new_token.user_id.to_string())
        .bind(&new_token.client_id)
        .bind(&new_token.scope)
        .bind(&new_token.user_agent)
        .bind(&new_token.ip_address)
        .bind(new_token.expires_at)
        .bind(new_token.revoked_at)
        .bind(new_token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Revoke every live refresh token for a user/client pair
    ///
    /// Invoked when a spent authorization code is presented again, which is
    /// treated as a possible code-leak signal.
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn revoke_all_refresh_tokens(
        &self,
        user_id: Uuid,
        client_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r"
            UPDATE refresh_tokens SET revoked_at = ?
            WHERE user_id = ? AND client_id = ? AND revoked_at IS NULL
            ",
        )
        .bind(revoked_at)
        .bind(user_id.to_string())
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_refresh_token(row: &sqlx::sqlite::SqliteRow) -> Result<RefreshToken> {
    Ok(RefreshToken {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        token_hash: row.get("token_hash"),
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
        client_id: row.get("client_id"),
        scope: row.get("scope"),
        user_agent: row.get("user_agent"),
        ip_address: row.get("ip_address"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        created_at: row.get("created_at"),
    })
}
