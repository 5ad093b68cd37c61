//! Job Claim Coordinator.
//!
//! Validates technicians, runs the atomic dispatch transitions through the
//! [`DispatchStore`](fieldops_db::DispatchStore), and on success fans the
//! change out to the customer (via the delivery queue) and to dashboards
//! (via the event bus).

mod coordinator;

pub use coordinator::{Coordinator, DispatchOutcome, OPEN_JOBS_LIMIT};
