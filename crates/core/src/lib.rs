pub mod config;
pub mod domain;
pub mod errors;
pub mod trust;

pub use chrono;

pub use config::{AppConfig, ConfigError, ConfigOverrides, Environment, LoadOptions, ServerRole};
pub use domain::principal::{Principal, UserRecord};
pub use domain::tenant::{
    email_domain, normalize_domain, normalize_email, AccessRuleError, CustomerId, Tenant,
};
pub use errors::{AuthError, GatewayError};
pub use trust::{TrustMode, TrustSigner};
