//! Request handlers.

pub mod authorize;
pub mod callback;
pub mod editor;
pub mod fallback;
pub mod files;
pub mod health;
pub mod oauth;
pub mod settings;
