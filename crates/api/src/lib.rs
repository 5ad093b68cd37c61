//! FieldOps dispatch API server library.
//!
//! Exposes config, state, error handling, routes, the dispatch coordinator
//! and the real-time hub so integration tests and the binary entrypoint can
//! both access them.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
