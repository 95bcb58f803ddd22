use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use relay_core::domain::tenant::{CustomerId, Tenant};

use super::{RepositoryError, TenantRepository};
use crate::DbPool;

const TENANT_COLUMNS: &str = "id, name, enabled, endpoint, allowed_domains, allowed_emails, \
     rate_limit_per_minute, created_at";

pub struct SqlTenantRepository {
    pool: DbPool,
}

impl SqlTenantRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TenantRepository for SqlTenantRepository {
    async fn get(&self, id: &CustomerId) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenant WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(tenant_from_row).transpose()
    }

    async fn put(&self, tenant: Tenant) -> Result<(), RepositoryError> {
        let allowed_domains = encode_list(&tenant.allowed_domains)?;
        let allowed_emails = encode_list(&tenant.allowed_emails)?;

        sqlx::query(
            "INSERT INTO tenant (
                id,
                name,
                enabled,
                endpoint,
                allowed_domains,
                allowed_emails,
                rate_limit_per_minute,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                enabled = excluded.enabled,
                endpoint = excluded.endpoint,
                allowed_domains = excluded.allowed_domains,
                allowed_emails = excluded.allowed_emails,
                rate_limit_per_minute = excluded.rate_limit_per_minute",
        )
        .bind(&tenant.id.0)
        .bind(&tenant.name)
        .bind(i64::from(tenant.enabled))
        .bind(&tenant.endpoint)
        .bind(allowed_domains)
        .bind(allowed_emails)
        .bind(tenant.rate_limit_per_minute.map(i64::from))
        .bind(tenant.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<Tenant>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {TENANT_COLUMNS} FROM tenant ORDER BY id ASC"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(tenant_from_row).collect()
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant
             WHERE EXISTS (
                SELECT 1 FROM json_each(tenant.allowed_domains)
                WHERE json_each.value = ?
             )
             LIMIT 1"
        ))
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        row.map(tenant_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Tenant>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenant
             WHERE EXISTS (
                SELECT 1 FROM json_each(tenant.allowed_emails)
                WHERE json_each.value = ?
             )
             LIMIT 1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(tenant_from_row).transpose()
    }
}

fn encode_list(values: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(values)
        .map_err(|error| RepositoryError::Decode(format!("could not encode access list: {error}")))
}

fn decode_list(raw: &str, column: &str) -> Result<Vec<String>, RepositoryError> {
    serde_json::from_str(raw).map_err(|error| {
        RepositoryError::Decode(format!("could not decode `{column}` json list: {error}"))
    })
}

fn tenant_from_row(row: SqliteRow) -> Result<Tenant, RepositoryError> {
    let allowed_domains: String = row.get("allowed_domains");
    let allowed_emails: String = row.get("allowed_emails");

    Ok(Tenant {
        id: CustomerId(row.get("id")),
        name: row.get("name"),
        enabled: row.get::<i64, _>("enabled") != 0,
        endpoint: row.get("endpoint"),
        allowed_domains: decode_list(&allowed_domains, "allowed_domains")?,
        allowed_emails: decode_list(&allowed_emails, "allowed_emails")?,
        rate_limit_per_minute: row
            .get::<Option<i64>, _>("rate_limit_per_minute")
            .map(|value| value as u32),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}
