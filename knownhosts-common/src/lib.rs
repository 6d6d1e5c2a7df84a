//! Common components and data for knownhosts crates.

#[cfg(feature = "logging")]
pub mod logging;
pub mod ssh;
