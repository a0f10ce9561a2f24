//! Core module for Kiln
//!
//! This module contains the engine, configuration, error types and the
//! project manifest.

pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;

pub use config::Config;
pub use engine::Engine;
pub use error::{KilnError, KilnResult};
pub use manifest::Manifest;
