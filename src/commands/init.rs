use camino::Utf8PathBuf;
use clap::Parser;
use ohno::IntoAppError;
use repo_miner::Result;
use repo_miner::config::DEFAULT_CONFIG_TOML;
use std::fs;

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output configuration file path
    #[arg(value_name = "PATH", default_value = "miner.toml")]
    pub output: Utf8PathBuf,
}

pub fn init_config(args: &InitArgs) -> Result<()> {
    fs::write(&args.output, DEFAULT_CONFIG_TOML)
        .into_app_err_with(|| format!("writing configuration to {}", args.output))?;
    println!("Generated default configuration file: {}", args.output);
    Ok(())
}
