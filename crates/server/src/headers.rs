//! Header names shared by the gateway and the tenant backend.

/// Marker the gateway sets on every forwarded request. The backend trusts
/// the identity headers only when the accompanying signature checks out.
pub const GATEWAY_VERIFIED: &str = "x-gateway-verified";
pub const USER_ID: &str = "x-user-id";
pub const CUSTOMER_ID: &str = "x-customer-id";
pub const GATEWAY_SIGNATURE: &str = "x-gateway-signature";
/// Conversation correlation header, passed through both hops untouched.
pub const THREAD_ID: &str = "x-thread-id";
