//! STATEDUMP Core Library
//!
//! Core types, traits, and configuration shared by the state export engine.
//! This crate provides the foundation for all other STATEDUMP components.

pub mod types;
pub mod traits;
pub mod error;
pub mod config;

pub use types::*;
pub use traits::*;
pub use error::*;
pub use config::*;
