//! Route handlers for the HTTP API.

pub mod compat;
pub mod health;
pub mod proxy;
