//! Graphwatch Core Components
//!
//! Configuration loading and error types shared by graphwatch front ends.

mod config;
mod error;

pub use config::Config;
pub use error::CoreError;
