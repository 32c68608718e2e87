// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! User storage and login-attempt counters

use super::Database;
use crate::models::User;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_users(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                password_hash TEXT NOT NULL,
                display_name TEXT,
                failed_login_attempts INTEGER NOT NULL DEFAULT 0,
                locked_until TEXT,
                last_login_at TEXT,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert a new user row
    ///
    /// Emails are stored lowercased so lookups stay case-insensitive.
    ///
    /// # Errors
    /// Returns an error on duplicate email or database failure
    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO users (id, email, email_verified, password_hash, display_name,
                               failed_login_attempts, locked_until, last_login_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(user.id.to_string())
        .bind(user.email.to_lowercase())
        .bind(user.email_verified)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.failed_login_attempts)
        .bind(user.locked_until)
        .bind(user.last_login_at)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a user by email (matched lowercased)
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Look up a user by id
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Persist a failed login attempt, optionally locking the account
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn record_failed_login(
        &self,
        user_id: Uuid,
        failed_attempts: i64,
        locked_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query("UPDATE users SET failed_login_attempts = ?, locked_until = ? WHERE id = ?")
            .bind(failed_attempts)
            .bind(locked_until)
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Reset the failure counter, clear any lock, and stamp the login time
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn record_successful_login(
        &self,
        user_id: Uuid,
        login_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE users
            SET failed_login_attempts = 0, locked_until = NULL, last_login_at = ?
            WHERE id = ?
            ",
        )
        .bind(login_at)
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        email: row.get("email"),
        email_verified: row.get("email_verified"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        failed_login_attempts: row.get("failed_login_attempts"),
        locked_until: row.get("locked_until"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
    })
}
