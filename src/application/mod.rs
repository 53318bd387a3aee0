//! Application services: profile lookup, avatar relay, card rendering,
//! image export and delivery.

pub mod cards;
pub mod delivery;
pub mod error;
pub mod export;
pub mod profile;
pub mod relay;
pub mod render;
pub mod upstream;
