//! Ritual card generator: profile lookup, avatar relay, SVG card rendering,
//! PNG export and device-aware delivery.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod presentation;
pub mod util;
