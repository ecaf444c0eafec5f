//! Content-server plumbing: the `kiwix-serve` subprocess and page retrieval.
//!
//! This crate provides:
//! - [`ServerSession`]: spawns, health-probes, and tears down the server
//! - [`ContentFetcher`]: fetches rendered pages from a running server

pub mod fetch;
pub mod session;

pub use fetch::ContentFetcher;
pub use session::ServerSession;

/// User-Agent string for requests to the content server.
pub(crate) const USER_AGENT: &str = concat!("zimport/", env!("CARGO_PKG_VERSION"));
