//! sr-core: shared error type, configuration, and media-domain types.
//!
//! This crate is the foundational dependency for all other sr-* crates,
//! providing a unified error type that maps onto HTTP statuses, the JSON
//! application configuration, and the small set of media enums the proxy and
//! the compatibility supervisor agree on.

pub mod config;
pub mod error;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use media::*;
