use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tenant::CustomerId;

/// The authenticated identity of an inbound caller, materialized per request
/// from a verified credential. `customer_id` is empty until resolution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub customer_id: Option<CustomerId>,
}

impl Principal {
    pub fn unresolved(uid: impl Into<String>, email: Option<String>) -> Self {
        Self { uid: uid.into(), email, customer_id: None }
    }
}

/// Durable user record backing resolution step 1. Once `customer_id` is
/// persisted here, re-resolving the same principal never searches again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub email: Option<String>,
    pub customer_id: Option<CustomerId>,
    /// Distinguishes domain/email auto-assignment from a manual
    /// administrative binding, for audit.
    pub auto_assigned: bool,
    pub updated_at: DateTime<Utc>,
}
