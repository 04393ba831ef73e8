// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use tokio::sync::Mutex;
use url::Url;

use super::row::EpisodeRow;
use crate::episode::Episode;
use crate::error::CatalogError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    episode_id          TEXT PRIMARY KEY NOT NULL,
    url                 TEXT NOT NULL UNIQUE,
    title               TEXT NOT NULL,
    description         TEXT,
    image_url           TEXT NOT NULL,
    published_at        INTEGER NOT NULL,
    size_in_bytes       INTEGER,
    duration_in_seconds INTEGER
);
CREATE INDEX IF NOT EXISTS idx_episodes_published ON episodes (published_at DESC, episode_id ASC);
"#;

const SELECT_COLUMNS: &str = "SELECT episode_id, url, title, description, image_url, published_at, \
     size_in_bytes, duration_in_seconds FROM episodes";

/// Durable episode records keyed by episode id
///
/// Mutations are staged in an open transaction and only become durable on
/// [`Catalog::commit`]. Reads see staged mutations.
pub struct Catalog {
    pool: Pool<Sqlite>,
    pending: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl Catalog {
    /// Open (or create) the catalog database at `path`
    pub async fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::CreateDirectoryFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let catalog = Self {
            pool,
            pending: Mutex::new(None),
        };
        catalog.migrate().await?;

        tracing::debug!(path = %path.display(), "Opened episode catalog");
        Ok(catalog)
    }

    async fn migrate(&self) -> Result<(), CatalogError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Reuse the open transaction or begin a new one
    async fn transaction<'g>(
        &self,
        slot: &'g mut Option<Transaction<'static, Sqlite>>,
    ) -> Result<&'g mut Transaction<'static, Sqlite>, CatalogError> {
        let tx = match slot.take() {
            Some(tx) => tx,
            None => self.pool.begin().await?,
        };
        Ok(slot.insert(tx))
    }

    /// Look up the episode recorded for a source URL
    pub async fn find_by_url(&self, url: &Url) -> Result<Option<Episode>, CatalogError> {
        let mut slot = self.pending.lock().await;
        let tx = self.transaction(&mut slot).await?;

        let row: Option<EpisodeRow> = sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE url = ?"))
            .bind(url.as_str())
            .fetch_optional(&mut **tx)
            .await?;

        row.map(Episode::try_from).transpose()
    }

    /// Record a newly discovered episode
    ///
    /// Fails with [`CatalogError::DuplicateKey`] if the id is already taken.
    pub async fn insert(&self, episode: &Episode) -> Result<(), CatalogError> {
        let mut slot = self.pending.lock().await;
        let tx = self.transaction(&mut slot).await?;

        let existing: Option<(String,)> =
            sqlx::query_as("SELECT url FROM episodes WHERE episode_id = ?")
                .bind(episode.episode_id.as_str())
                .fetch_optional(&mut **tx)
                .await?;

        if let Some((existing_url,)) = existing {
            return Err(CatalogError::DuplicateKey {
                episode_id: episode.episode_id.to_string(),
                existing_url,
                url: episode.url.to_string(),
            });
        }

        let row = EpisodeRow::from(episode);
        sqlx::query(
            "INSERT INTO episodes (episode_id, url, title, description, image_url, published_at, \
             size_in_bytes, duration_in_seconds) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.episode_id)
        .bind(&row.url)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.image_url)
        .bind(row.published_at)
        .bind(row.size_in_bytes)
        .bind(row.duration_in_seconds)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Overwrite the mutable fields of an existing record
    pub async fn update(&self, episode: &Episode) -> Result<(), CatalogError> {
        let mut slot = self.pending.lock().await;
        let tx = self.transaction(&mut slot).await?;

        let row = EpisodeRow::from(episode);
        let result = sqlx::query(
            "UPDATE episodes SET title = ?, description = ?, image_url = ?, published_at = ?, \
             size_in_bytes = ?, duration_in_seconds = ? WHERE episode_id = ?",
        )
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.image_url)
        .bind(row.published_at)
        .bind(row.size_in_bytes)
        .bind(row.duration_in_seconds)
        .bind(&row.episode_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound {
                episode_id: row.episode_id,
            });
        }
        Ok(())
    }

    /// The `limit` most recently published episodes, newest first
    ///
    /// Ties on publish time are ordered by episode id ascending.
    pub async fn most_recent(&self, limit: usize) -> Result<Vec<Episode>, CatalogError> {
        let mut slot = self.pending.lock().await;
        let tx = self.transaction(&mut slot).await?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<EpisodeRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} ORDER BY published_at DESC, episode_id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(Episode::try_from).collect()
    }

    /// Make all staged mutations durable
    pub async fn commit(&self) -> Result<(), CatalogError> {
        let mut slot = self.pending.lock().await;
        if let Some(tx) = slot.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    /// Close the database; staged mutations that were never committed are dropped
    pub async fn close(self) {
        if let Some(tx) = self.pending.into_inner() {
            let _ = tx.rollback().await;
        }
        self.pool.close().await;
    }
}
