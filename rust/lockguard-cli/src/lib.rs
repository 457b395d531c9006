//! Lockguard CLI library.
//!
//! Shared functionality of the `lockguard` binary: configuration, file-backed
//! repositories and the command implementations.

pub mod colors;
pub mod commands;
pub mod config;
pub mod error;
pub mod sources;

pub use error::CliError;
