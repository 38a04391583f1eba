//! Arguments and setup logic shared between subcommands.

use camino::Utf8PathBuf;
use clap::Args;
use clap::ValueEnum;
use repo_miner::github::GITHUB_API_BASE_URL;

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    None,
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Info, warning, and error messages
    Info,
    /// Debug and above messages
    Debug,
    /// All messages including trace
    Trace,
}

/// Common arguments shared between subcommands
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// GitHub personal access token
    #[arg(long, value_name = "TOKEN", env = "GITHUB_TOKEN")]
    pub github_token: Option<String>,

    /// Path to configuration file [default: one of miner.[toml|yml|yaml|json] ]
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,

    /// Directory where the output document is written, overriding the configured value
    #[arg(long, value_name = "PATH")]
    pub output_dir: Option<Utf8PathBuf>,

    /// Base URL of the GitHub REST API
    #[arg(long, value_name = "URL", default_value = GITHUB_API_BASE_URL, hide = true)]
    pub api_url: String,

    /// Set the logging level for diagnostic output
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,
}

/// Initialize logger based on log level
pub fn init_logging(log_level: LogLevel) {
    if log_level == LogLevel::None {
        return;
    }

    let level = match log_level {
        LogLevel::None => return, // Already checked above, but being explicit
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_module_path(false)
        .format_target(matches!(log_level, LogLevel::Debug) || matches!(log_level, LogLevel::Trace))
        .init();
}

/// Print configuration warnings to stderr
pub fn report_warnings(warnings: &[String]) {
    if !warnings.is_empty() {
        eprintln!("\n⚠️  Configuration validation warnings:");
        for warning in warnings {
            eprintln!("   {warning}");
        }
        eprintln!();
    }
}
