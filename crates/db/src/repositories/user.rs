use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::principal::UserRecord;
use relay_core::domain::tenant::CustomerId;

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn get(&self, uid: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT uid, email, customer_id, auto_assigned, updated_at
             FROM app_user
             WHERE uid = ?",
        )
        .bind(uid)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(user_from_row))
    }

    async fn upsert_assignment(
        &self,
        uid: &str,
        email: Option<&str>,
        customer_id: &CustomerId,
        auto_assigned: bool,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO app_user (uid, email, customer_id, auto_assigned, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(uid) DO UPDATE SET
                email = excluded.email,
                customer_id = excluded.customer_id,
                auto_assigned = excluded.auto_assigned,
                updated_at = excluded.updated_at",
        )
        .bind(uid)
        .bind(email)
        .bind(&customer_id.0)
        .bind(i64::from(auto_assigned))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn user_from_row(row: SqliteRow) -> UserRecord {
    UserRecord {
        uid: row.get("uid"),
        email: row.get("email"),
        customer_id: row.get::<Option<String>, _>("customer_id").map(CustomerId),
        auto_assigned: row.get::<i64, _>("auto_assigned") != 0,
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}
