//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus the create DTO used by inserts.

pub mod assignment;
pub mod job;
pub mod notification_intent;
pub mod status;
pub mod technician;
