#![doc = include_str!("../README.md")]

pub mod cli;
pub mod commands;
pub mod config;
mod error;

pub use commands::ExitStatus;
pub use error::Error;
