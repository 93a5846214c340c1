//! Account registration and wallet views for chat users.

pub mod handlers;
