pub mod connection;
pub mod migrations;
pub mod repositories;

pub use connection::{connect, ephemeral_config, DbPool};
pub use repositories::{
    InMemoryRateLimitStore, InMemoryTenantRepository, InMemoryUserRepository, RateDecision,
    RateLimitStore, RepositoryError, SqlRateLimitStore, SqlTenantRepository, SqlUserRepository,
    TenantRepository, UserRepository,
};
