#![doc = include_str!("../README.md")]

pub mod algorithm;
pub mod codec;
pub mod entry;
mod error;
pub mod file;
pub mod fingerprint;
pub mod matcher;
pub mod pattern;
pub mod store;
pub mod verify;

pub use error::Error;
pub use verify::{KnownHosts, Verdict};
