//! Well-known role name constants carried in the `role` claim of access
//! tokens.

/// Back-office administrator. May observe every room and manage the
/// notification queue.
pub const ROLE_ADMIN: &str = "admin";

/// Office staff working the dashboard.
pub const ROLE_STAFF: &str = "staff";

/// Service identity used by the messaging front end to call the dispatch API.
pub const ROLE_DISPATCHER: &str = "dispatcher";

/// Customer portal user. Restricted to its own customer room.
pub const ROLE_CUSTOMER: &str = "customer";
