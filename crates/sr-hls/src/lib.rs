//! # sr-hls
//!
//! HLS playlist handling for the streamrelay proxy.
//!
//! - **Classification** ([`is_playlist`]) -- decide from URL and content type
//!   whether an upstream body is an `.m3u8` manifest.
//! - **Parameter schema** ([`ProxyParams`], [`Propagated`]) -- the single place
//!   where `/proxy` query strings are decoded and re-encoded.
//! - **Parsing** ([`playlist`]) -- master playlist variants and quote-aware
//!   attribute lists.
//! - **ABR selection** ([`abr::select`]) -- codec avoidance/preference,
//!   lowest-only and bandwidth caps.
//! - **Rewriting** ([`rewrite_playlist`]) -- every URI becomes a proxy URL that
//!   carries the propagated parameters forward.

pub mod abr;
pub mod classify;
pub mod params;
pub mod playlist;
pub mod rewrite;

pub use classify::{is_playlist, HLS_CONTENT_TYPE};
pub use params::{proxy_url, Propagated, ProxyParams, PROXY_PATH};
pub use playlist::{MasterPlaylist, Variant};
pub use rewrite::{rewrite_playlist, RewriteContext};
