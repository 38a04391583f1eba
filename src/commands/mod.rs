//! Subcommand implementations.

mod common;
mod init;
mod run;
mod validate;

pub use init::{InitArgs, init_config};
pub use run::{RunArgs, run_extraction};
pub use validate::{ValidateArgs, validate_config};
