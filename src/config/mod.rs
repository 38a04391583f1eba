//! Extraction run configuration.

pub mod config;

pub use config::{Config, DEFAULT_CONFIG_TOML, StateFilter};
