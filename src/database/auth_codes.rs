// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Authorization code storage with exactly-once consumption

use super::Database;
use crate::models::AuthorizationCode;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_auth_codes(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS authorization_codes (
                code_hash TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                redirect_uri TEXT NOT NULL,
                scope TEXT NOT NULL,
                code_challenge TEXT,
                code_challenge_method TEXT,
                nonce TEXT,
                expires_at TEXT NOT NULL,
                used_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_auth_codes_expires_at ON authorization_codes(expires_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Persist a freshly minted authorization code (by digest)
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn store_auth_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO authorization_codes (code_hash, client_id, user_id, redirect_uri, scope,
                                             code_challenge, code_challenge_method, nonce,
                                             expires_at, used_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&code.code_hash)
        .bind(&code.client_id)
        .bind(code.user_id.to_string())
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.code_challenge)
        .bind(&code.code_challenge_method)
        .bind(&code.nonce)
        .bind(code.expires_at)
        .bind(code.used_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a code row by digest, used or not
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn get_auth_code(&self, code_hash: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query("SELECT * FROM authorization_codes WHERE code_hash = ?")
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_auth_code(&r)).transpose()
    }

    /// Mark a code used, exactly once
    ///
    /// The conditional update is the exclusivity point: if two redemptions
    /// race on the same code, exactly one observes `used_at IS NULL` and gets
    /// a row count of 1; the loser gets 0 and must treat the code as spent.
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn consume_auth_code(
        &self,
        code_hash: &str,
        used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE authorization_codes SET used_at = ? WHERE code_hash = ? AND used_at IS NULL",
        )
        .bind(used_at)
        .bind(code_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Delete codes past their expiry (maintenance path)
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn delete_expired_auth_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM authorization_codes WHERE expires_at < ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_auth_code(row: &sqlx::sqlite::SqliteRow) -> Result<AuthorizationCode> {
    Ok(AuthorizationCode {
        code_hash: row.get("code_hash"),
        client_id: row.get("client_id"),
        user_id: Uuid::parse_str(&row.get::<String, _>("user_id"))?,
        redirect_uri: row.get("redirect_uri"),
        scope: row.get("scope"),
        code_challenge: row.get("code_challenge"),
        code_challenge_method: row.get("code_challenge_method"),
        nonce: row.get("nonce"),
        expires_at: row.get("expires_at"),
        used_at: row.get("used_at"),
        created_at: row.get("created_at"),
    })
}
