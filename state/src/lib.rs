//! STATEDUMP State Export
//!
//! Turns an account store into a Merkle-committed snapshot: every account is
//! canonically encoded into a leaf, the leaves are committed under one root,
//! and each account gets an inclusion proof against that root.

pub mod leaf;
pub mod memory;
pub mod persistent;
pub mod snapshot;
pub mod export;

pub use leaf::*;
pub use memory::*;
pub use persistent::*;
pub use snapshot::*;
pub use export::*;
