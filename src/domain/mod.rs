//! Domain layer types and invariants.

pub mod color;
pub mod error;
pub mod export;
pub mod handle;
pub mod platform;
pub mod profile;
pub mod role;
