//! Shared response envelope types for API handlers.
//!
//! List and detail responses use a `{ "data": ... }` envelope. Dispatch
//! calls return a [`DispatchOutcome`](crate::dispatch::DispatchOutcome)
//! directly, since the messaging front end matches on its `ok` / `reason`.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
