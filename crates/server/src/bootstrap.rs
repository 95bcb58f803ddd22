//! Process assembly: config, database, migrations and the role-appropriate
//! router.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use thiserror::Error;
use tracing::{info, warn};

use relay_agent::registry::AgentRegistry;
use relay_core::config::{AppConfig, ConfigError, LoadOptions, ServerRole};
use relay_core::trust::{TrustMode, TrustSigner};
use relay_db::{
    connect, migrations, DbPool, SqlRateLimitStore, SqlTenantRepository,
    SqlUserRepository,
};

use crate::admission::AdmissionController;
use crate::backend::{self, BackendState};
use crate::directory::TenantDirectory;
use crate::gateway::{self, GatewayState};
use crate::health;
use crate::routing::RoutingCache;
use crate::verifier::{
    CredentialVerifier, HttpCredentialVerifier, StaticCredentialVerifier, VerifiedIdentity,
};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let router = build_router(&config, &db_pool)?;
    Ok(Application { config, db_pool, router })
}

/// Assembles the router for the configured role. Gateway and backend share
/// the directory, signer and verifier; the combined role serves both
/// surfaces from one process for local development.
pub fn build_router(config: &AppConfig, db_pool: &DbPool) -> Result<Router, BootstrapError> {
    let tenants = Arc::new(SqlTenantRepository::new(db_pool.clone()));
    let users = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let directory =
        Arc::new(TenantDirectory::new(tenants, users, config.access.global_access));

    let signer = TrustSigner::from_secret(config.gateway.shared_secret.clone());
    if signer.mode() == TrustMode::Permissive {
        warn!(
            event_name = "system.bootstrap.trust_permissive",
            "no shared secret configured, trust checks are permissive"
        );
    }

    let verifier: Arc<dyn CredentialVerifier> = match &config.identity.verify_url {
        Some(url) => Arc::new(
            HttpCredentialVerifier::new(url, Duration::from_secs(config.identity.timeout_secs))
                .map_err(BootstrapError::HttpClient)?,
        ),
        None => {
            warn!(
                event_name = "system.bootstrap.dev_verifier",
                "no identity provider configured, accepting any token as the dev user"
            );
            Arc::new(StaticCredentialVerifier::accepting_any(VerifiedIdentity {
                uid: "dev-user-001".to_string(),
                email: Some("dev@example.com".to_string()),
            }))
        }
    };

    let gateway_router = || -> Result<Router, BootstrapError> {
        let state = GatewayState {
            verifier: verifier.clone(),
            directory: directory.clone(),
            routing: Arc::new(RoutingCache::new(Duration::from_secs(
                config.gateway.routing_cache_ttl_secs,
            ))),
            signer: signer.clone(),
            client: reqwest::Client::builder().build().map_err(BootstrapError::HttpClient)?,
            upstream_timeout: Duration::from_secs(config.gateway.upstream_timeout_secs),
            fallback_endpoint: config.gateway.fallback_endpoint.clone(),
        };
        Ok(gateway::router(state))
    };

    let backend_router = || {
        let state = BackendState {
            verifier: verifier.clone(),
            directory: directory.clone(),
            signer: signer.clone(),
            admission: Arc::new(AdmissionController::new(
                Arc::new(SqlRateLimitStore::new(db_pool.clone())),
                config.rate_limit.default_per_minute,
            )),
            agents: Arc::new(AgentRegistry::default()),
        };
        backend::router(state)
    };

    // Static routes win over the gateway catch-all, so /health and the
    // backend endpoints stay reachable in the combined role.
    let router = match config.server.role {
        ServerRole::Gateway => health::router(db_pool.clone()).merge(gateway_router()?),
        ServerRole::Backend => health::router(db_pool.clone()).merge(backend_router()),
        ServerRole::Combined => health::router(db_pool.clone())
            .merge(backend_router())
            .merge(gateway_router()?),
    };

    info!(
        event_name = "system.bootstrap.router_built",
        role = ?config.server.role,
        "router assembled"
    );
    Ok(router)
}

#[cfg(test)]
mod tests {
    use relay_core::config::{ConfigOverrides, LoadOptions, ServerRole};

    use super::bootstrap;

    fn options(role: ServerRole) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                server_role: Some(role),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_prepares_schema_and_router_for_each_role() {
        for role in [ServerRole::Gateway, ServerRole::Backend, ServerRole::Combined] {
            let app = bootstrap(options(role)).await.expect("bootstrap should succeed");

            let (table_count,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master \
                 WHERE type = 'table' AND name IN ('tenant', 'app_user', 'rate_window')",
            )
            .fetch_one(&app.db_pool)
            .await
            .expect("schema should be queryable after bootstrap");
            assert_eq!(table_count, 3);

            app.db_pool.close().await;
        }
    }
}
