//! Shared building blocks for the FieldOps dispatch backend.
//!
//! Everything here is free of I/O: identifiers, the domain error type,
//! well-known role and channel names, the injectable [`clock::Clock`], the
//! connection admission limiter, and the vocabulary used to reject dispatch
//! requests.

pub mod channels;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod rate_limit;
pub mod roles;
pub mod types;
