//! Core relay logic for the owner relay bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind the
//! messaging port (a trait) implemented in the adapter crate.

pub mod broadcast;
pub mod config;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod owner;
pub mod relay;
pub mod sessions;
pub mod state;
pub mod store;

pub use errors::{Error, Result};

#[cfg(test)]
mod testing;
