//! Core types and configuration shared by the LINE Bot SDK crates.

pub mod config;
pub mod secret;

pub use config::*;
pub use secret::ChannelSecret;
