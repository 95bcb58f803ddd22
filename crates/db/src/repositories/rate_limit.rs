use chrono::{DateTime, Duration, Utc};
use sqlx::Row;

use super::{RateDecision, RateLimitStore, RepositoryError};
use crate::DbPool;

const WINDOW_SECS: i64 = 60;
const MAX_ATTEMPTS: u32 = 3;

/// Versioned read-prune-check-append over the shared store. Concurrent
/// admits for the same user race on the conditional write; the loser
/// re-reads and re-evaluates, so a single remaining slot is never granted
/// twice.
pub struct SqlRateLimitStore {
    pool: DbPool,
}

impl SqlRateLimitStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RateLimitStore for SqlRateLimitStore {
    async fn try_admit(
        &self,
        user_id: &str,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, RepositoryError> {
        for _attempt in 0..MAX_ATTEMPTS {
            let row = sqlx::query("SELECT timestamps, version FROM rate_window WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

            let (mut window, version) = match &row {
                Some(row) => {
                    (decode_window(&row.get::<String, _>("timestamps"))?, Some(row.get::<i64, _>("version")))
                }
                None => (Vec::new(), None),
            };

            let cutoff = now - Duration::seconds(WINDOW_SECS);
            window.retain(|timestamp| *timestamp > cutoff);

            if window.len() as u32 >= limit {
                return Ok(RateDecision { allowed: false, remaining: 0 });
            }

            window.push(now);
            let encoded = encode_window(&window)?;

            let applied = match version {
                Some(version) => {
                    sqlx::query(
                        "UPDATE rate_window
                         SET timestamps = ?, version = version + 1, last_request = ?
                         WHERE user_id = ? AND version = ?",
                    )
                    .bind(&encoded)
                    .bind(now)
                    .bind(user_id)
                    .bind(version)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                        == 1
                }
                None => {
                    sqlx::query(
                        "INSERT INTO rate_window (user_id, timestamps, version, last_request)
                         VALUES (?, ?, 1, ?)
                         ON CONFLICT(user_id) DO NOTHING",
                    )
                    .bind(user_id)
                    .bind(&encoded)
                    .bind(now)
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
                        == 1
                }
            };

            if applied {
                return Ok(RateDecision {
                    allowed: true,
                    remaining: limit.saturating_sub(window.len() as u32),
                });
            }
            // Version moved under us; re-read and re-evaluate.
        }

        Err(RepositoryError::Conflict { attempts: MAX_ATTEMPTS })
    }
}

fn encode_window(window: &[DateTime<Utc>]) -> Result<String, RepositoryError> {
    serde_json::to_string(window)
        .map_err(|error| RepositoryError::Decode(format!("could not encode rate window: {error}")))
}

fn decode_window(raw: &str) -> Result<Vec<DateTime<Utc>>, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("could not decode rate window: {error}")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::SqlRateLimitStore;
    use crate::repositories::RateLimitStore;
    use crate::{connect, ephemeral_config, migrations};

    async fn store() -> SqlRateLimitStore {
        let pool = connect(&ephemeral_config())
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations should apply");
        SqlRateLimitStore::new(pool)
    }

    #[tokio::test]
    async fn admits_up_to_the_limit_then_denies() {
        let store = store().await;
        let now = Utc::now();

        for expected_remaining in [2, 1, 0] {
            let decision =
                store.try_admit("user-1", 3, now).await.expect("admit should succeed");
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = store.try_admit("user-1", 3, now).await.expect("admit should succeed");
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
    }

    #[tokio::test]
    async fn window_boundary_is_a_strict_sixty_seconds() {
        let store = store().await;
        let start = Utc::now();

        let first = store.try_admit("user-1", 2, start).await.expect("admit should succeed");
        assert!(first.allowed);

        // 59.9s later the first request still counts.
        let at_59_9 = start + Duration::milliseconds(59_900);
        assert!(store.try_admit("user-1", 2, at_59_9).await.expect("admit").allowed);
        assert!(!store.try_admit("user-1", 2, at_59_9).await.expect("admit").allowed);

        // 60.1s after the first request it has aged out; only the 59.9s one
        // still counts.
        let at_60_1 = start + Duration::milliseconds(60_100);
        assert!(store.try_admit("user-1", 2, at_60_1).await.expect("admit").allowed);
    }

    #[tokio::test]
    async fn denied_requests_do_not_consume_window_slots() {
        let store = store().await;
        let start = Utc::now();

        assert!(store.try_admit("user-1", 1, start).await.expect("admit").allowed);
        for _ in 0..5 {
            assert!(!store.try_admit("user-1", 1, start).await.expect("admit").allowed);
        }

        // Denials above must not have appended timestamps; once the original
        // request ages out, one slot is free again.
        let later = start + Duration::seconds(61);
        assert!(store.try_admit("user-1", 1, later).await.expect("admit").allowed);
    }

    #[tokio::test]
    async fn users_have_independent_windows() {
        let store = store().await;
        let now = Utc::now();

        assert!(store.try_admit("user-1", 1, now).await.expect("admit").allowed);
        assert!(store.try_admit("user-2", 1, now).await.expect("admit").allowed);
        assert!(!store.try_admit("user-1", 1, now).await.expect("admit").allowed);
    }

    #[tokio::test]
    async fn concurrent_requests_for_the_last_slot_admit_exactly_one() {
        let store = Arc::new(store().await);
        let now = Utc::now();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.try_admit("user-1", 1, now).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.try_admit("user-1", 1, now).await })
        };

        let a = a.await.expect("task").expect("admit should succeed");
        let b = b.await.expect("task").expect("admit should succeed");

        assert!(a.allowed != b.allowed, "exactly one of two racing requests may win the last slot");
    }
}
