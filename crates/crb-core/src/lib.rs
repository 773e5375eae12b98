//! Core of the channel relay bot.
//!
//! The mapping store, the forwarder and configuration live here. Telegram is
//! reached only through the `RelayPort` trait implemented in `crb-telegram`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod forwarder;
pub mod logging;
pub mod messaging;
pub mod store;

pub use errors::{Error, Result};
