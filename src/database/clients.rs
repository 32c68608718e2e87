// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! OAuth client registry storage

use super::Database;
use crate::crypto;
use crate::models::OAuthClient;
use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_clients(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS oauth_clients (
                id TEXT PRIMARY KEY,
                client_id TEXT UNIQUE NOT NULL,
                client_secret_hash TEXT,
                name TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                allowed_scopes TEXT NOT NULL,
                allowed_grant_types TEXT NOT NULL,
                is_confidential BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_oauth_clients_client_id ON oauth_clients(client_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Register a client (admin/seed path; not exposed over HTTP)
    ///
    /// # Errors
    /// Returns an error on duplicate client_id or database failure
    pub async fn create_client(&self, client: &OAuthClient) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO oauth_clients (id, client_id, client_secret_hash, name, redirect_uris,
                                       allowed_scopes, allowed_grant_types, is_confidential, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(client.id.to_string())
        .bind(&client.client_id)
        .bind(&client.client_secret_hash)
        .bind(&client.name)
        .bind(serde_json::to_string(&client.redirect_uris)?)
        .bind(serde_json::to_string(&client.allowed_scopes)?)
        .bind(serde_json::to_string(&client.allowed_grant_types)?)
        .bind(client.is_confidential)
        .bind(client.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Look up a client by its public identifier
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn get_client(&self, client_id: &str) -> Result<Option<OAuthClient>> {
        let row = sqlx::query("SELECT * FROM oauth_clients WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_client(&r)).transpose()
    }

    /// Validate a confidential client's secret
    ///
    /// Compares the secret's digest against the stored hash; raw secrets are
    /// never stored or compared. Returns the client only on a match.
    ///
    /// # Errors
    /// Returns an error on database failure
    pub async fn validate_client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Option<OAuthClient>> {
        let Some(client) = self.get_client(client_id).await? else {
            return Ok(None);
        };

        let secret_matches = client
            .client_secret_hash
            .as_deref()
            .is_some_and(|stored| {
                crypto::timing_safe_compare(&crypto::hash_token(client_secret), stored)
            });

        Ok(secret_matches.then_some(client))
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthClient> {
    Ok(OAuthClient {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        client_id: row.get("client_id"),
        client_secret_hash: row.get("client_secret_hash"),
        name: row.get("name"),
        redirect_uris: serde_json::from_str(&row.get::<String, _>("redirect_uris"))?,
        allowed_scopes: serde_json::from_str(&row.get::<String, _>("allowed_scopes"))?,
        allowed_grant_types: serde_json::from_str(&row.get::<String, _>("allowed_grant_types"))?,
        is_confidential: row.get("is_confidential"),
        created_at: row.get("created_at"),
    })
}
