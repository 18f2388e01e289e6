//! `SQLite` storage for received tweets.
//!
//! Persistent storage plus the derived embeddings table used by semantic
//! search. Schema changes beyond the bootstrap go through the migration
//! engine; embeddings are derived data and re-creatable, so they live
//! outside the migration ledger.

use crate::embedder::{HashEmbedder, dot_product, embedding_from_bytes, embedding_to_bytes};
use crate::error::Result;
use crate::model::{IncomingTweet, InsertOutcome, SearchHit, Tweet};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params};
use std::path::Path;
use tracing::{debug, info};

/// `SQLite` storage manager.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Set pragmas for durability and single-writer performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let storage = Self { conn };
        storage.bootstrap()?;
        Ok(storage)
    }

    /// Create the current schema if missing.
    ///
    /// Safe on every startup; existing databases are upgraded by the
    /// migration engine before this runs, so every `IF NOT EXISTS` here is a
    /// no-op for them.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub fn bootstrap(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS tweets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                link_to_tweet TEXT NOT NULL,
                created_at TEXT,
                created_at_parsed TEXT,
                text TEXT NOT NULL,
                received_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_tweets_created_at_parsed
                ON tweets(created_at_parsed);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tweets_unique
                ON tweets(user_name, link_to_tweet, text);

            -- Derived data for semantic search; rebuilt by backfill, not
            -- tracked in the migration ledger.
            CREATE TABLE IF NOT EXISTS embeddings (
                tweet_id INTEGER PRIMARY KEY,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Store an incoming webhook tweet.
    ///
    /// Duplicate rows (same user, link, and text) are rejected by the
    /// database's unique constraint and reported as
    /// [`InsertOutcome::Duplicate`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the unique constraint.
    pub fn insert_tweet(&self, incoming: &IncomingTweet) -> Result<InsertOutcome> {
        let parsed = crate::date_parser::parse_ifttt_date(&incoming.created_at);
        self.insert_row(
            &incoming.user_name,
            &incoming.link_to_tweet,
            &incoming.created_at,
            parsed,
            &incoming.text,
        )
    }

    /// Insert a tweet row with an already-parsed timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error for any failure other than the unique constraint.
    pub fn insert_row(
        &self,
        user_name: &str,
        link_to_tweet: &str,
        created_at: &str,
        created_at_parsed: Option<DateTime<Utc>>,
        text: &str,
    ) -> Result<InsertOutcome> {
        let result = self.conn.execute(
            "INSERT INTO tweets (user_name, link_to_tweet, created_at, created_at_parsed, text)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user_name,
                link_to_tweet,
                created_at,
                created_at_parsed.map(|dt| dt.to_rfc3339()),
                text,
            ],
        );

        match result {
            Ok(_) => {
                let id = self.conn.last_insert_rowid();
                debug!("Stored tweet {id} from @{user_name}");
                Ok(InsertOutcome::Inserted(id))
            }
            Err(e) if is_constraint_violation(&e) => {
                info!("Duplicate tweet from @{user_name} rejected by unique constraint");
                Ok(InsertOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get the latest tweets, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_tweets(&self, limit: usize) -> Result<Vec<Tweet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_name, link_to_tweet, created_at, created_at_parsed, text, received_at
             FROM tweets
             ORDER BY created_at_parsed DESC, created_at DESC
             LIMIT ?1",
        )?;
        let tweets = stmt
            .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], row_to_tweet)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tweets)
    }

    /// Search tweets by text, with `from:<user>` fuzzy username filtering.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn search_tweets(&self, query: &str, limit: usize) -> Result<Vec<Tweet>> {
        let (sql_filter, pattern) = query.strip_prefix("from:").map_or_else(
            || ("text LIKE ?1", format!("%{query}%")),
            |user| ("user_name LIKE ?1", format!("%{user}%")),
        );

        let sql = format!(
            "SELECT id, user_name, link_to_tweet, created_at, created_at_parsed, text, received_at
             FROM tweets
             WHERE {sql_filter}
             ORDER BY created_at_parsed DESC, created_at DESC
             LIMIT ?2"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tweets = stmt
            .query_map(
                params![pattern, i64::try_from(limit).unwrap_or(i64::MAX)],
                row_to_tweet,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tweets)
    }

    /// Fetch one tweet by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_tweet(&self, id: i64) -> Result<Option<Tweet>> {
        let result = self.conn.query_row(
            "SELECT id, user_name, link_to_tweet, created_at, created_at_parsed, text, received_at
             FROM tweets WHERE id = ?1",
            params![id],
            row_to_tweet,
        );
        match result {
            Ok(tweet) => Ok(Some(tweet)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Total stored tweets.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count_tweets(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM tweets", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All tweets in export order (same ordering as [`Self::latest_tweets`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_tweets(&self) -> Result<Vec<Tweet>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_name, link_to_tweet, created_at, created_at_parsed, text, received_at
             FROM tweets
             ORDER BY created_at_parsed DESC, created_at DESC",
        )?;
        let tweets = stmt
            .query_map([], row_to_tweet)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tweets)
    }

    // =========================================================================
    // Embeddings
    // =========================================================================

    /// Store (or replace) the embedding for a tweet.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn store_embedding(&self, tweet_id: i64, embedding: &[f32]) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO embeddings (tweet_id, embedding, created_at)
             VALUES (?1, ?2, ?3)",
            params![tweet_id, embedding_to_bytes(embedding), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Embed every tweet that has no embedding yet, resuming from the
    /// highest embedded id.
    ///
    /// Returns the number of embeddings created.
    ///
    /// # Errors
    ///
    /// Returns an error if reading tweets or writing embeddings fails.
    pub fn backfill_embeddings(&self, embedder: &HashEmbedder) -> Result<usize> {
        let max_embedded: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(tweet_id), 0) FROM embeddings",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT id, text FROM tweets WHERE id > ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![max_embedded], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut created = 0;
        for (id, text) in rows {
            if text.is_empty() {
                continue;
            }
            self.store_embedding(id, &embedder.embed(&text))?;
            created += 1;
        }

        if created > 0 {
            info!("Backfilled {created} tweet embedding(s)");
        }
        Ok(created)
    }

    /// Semantic search: embed the query, score every stored embedding by
    /// cosine similarity, return the top `limit` tweets.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    pub fn semantic_search(
        &self,
        embedder: &HashEmbedder,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_embedding = embedder.embed(query);

        let mut stmt = self
            .conn
            .prepare("SELECT tweet_id, embedding FROM embeddings")?;
        let mut scored = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|(id, blob)| {
                let embedding = embedding_from_bytes(&blob);
                (id, dot_product(&query_embedding, &embedding))
            })
            .collect::<Vec<_>>();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);

        let mut hits = Vec::with_capacity(scored.len());
        for (id, similarity) in scored {
            if let Some(tweet) = self.get_tweet(id)? {
                hits.push(SearchHit {
                    tweet,
                    similarity: Some(similarity),
                });
            }
        }
        Ok(hits)
    }
}

fn row_to_tweet(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tweet> {
    let parsed: Option<String> = row.get(4)?;
    Ok(Tweet {
        id: row.get(0)?,
        user_name: row.get(1)?,
        link_to_tweet: row.get(2)?,
        created_at: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        created_at_parsed: parsed
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
        text: row.get(5)?,
        received_at: row.get(6)?,
    })
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}
