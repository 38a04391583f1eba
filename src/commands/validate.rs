use camino::Utf8PathBuf;
use clap::Parser;
use repo_miner::Result;
use repo_miner::config::Config;

use crate::commands::common::report_warnings;

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file [default: one of miner.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
}

#[expect(clippy::unnecessary_wraps, reason = "Consistent interface with other subcommands")]
pub fn validate_config(args: &ValidateArgs) -> Result<()> {
    let base_path = Utf8PathBuf::from(".");
    let config_path = args.config.as_ref();

    match Config::load(&base_path, config_path) {
        Ok((config, warnings)) => {
            println!("Configuration validation successful");
            if let Some(path) = config_path {
                println!("Config file: {path}");
            }
            println!("Repository: {}, items #{} through #{}", config.repo, config.range.low, config.range.high);

            report_warnings(&warnings);
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed: {e}");
            std::process::exit(1);
        }
    }
}
