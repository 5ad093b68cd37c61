//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod assignment_repo;
pub mod job_repo;
pub mod notification_intent_repo;
pub mod technician_repo;

pub use assignment_repo::AssignmentRepo;
pub use job_repo::JobRepo;
pub use notification_intent_repo::NotificationIntentRepo;
pub use technician_repo::TechnicianRepo;
