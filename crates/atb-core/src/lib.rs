//! Core domain + application logic for the assistant Telegram bot.
//!
//! This crate is framework-agnostic. Telegram and the OpenAI Assistants API
//! live behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod conversation;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod greeting;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod relay;
pub mod run_waiter;

pub use errors::{Error, Result};
