//! Supporting services for handlers.

pub mod cookies;
