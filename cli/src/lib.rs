//! STATEDUMP CLI library
//!
//! Glue between the command line and the export engine: opening the account
//! store, applying configuration, and reading or writing snapshot files.

pub mod commands;

pub use commands::*;
