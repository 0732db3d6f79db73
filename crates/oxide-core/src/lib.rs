//! Core domain + application logic for the Oxide suggestions bot.
//!
//! This crate is intentionally framework-agnostic. The chat platform lives behind
//! ports (traits) implemented in adapter crates.

pub mod config;
pub mod dialogs;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod store;
pub mod suggestions;
pub mod utils;

pub use errors::{Error, Result};
