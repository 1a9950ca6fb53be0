//! Request middleware.

pub mod auth;
pub mod cancellation;
pub mod rate_limit;
