//! # repo-miner: resumable GitHub metadata extraction
//!
//! `repo-miner` pulls structured metadata about commits, issues, and pull
//! requests out of the GitHub REST API over a numbered item range and merges
//! it into a single human-inspectable JSON document. The document doubles as
//! the tool's checkpoint: a run can be interrupted (rate limiting, crash,
//! Ctrl-C) and resumed later, and only fields that are still missing get
//! fetched again.
//!
//! # Quick Start
//!
//! Generate a configuration file and edit it:
//!
//! ```bash
//! repo-miner init
//! ```
//!
//! Then run the extraction:
//!
//! ```bash
//! repo-miner run
//! ```
//!
//! The output lands at `<output_dir>/<repo_name>/<repo_name>_output.json`,
//! keyed by item type, then item number, then field name:
//!
//! ```json
//! {
//!   "issues": {
//!     "270": {
//!       "number": 270,
//!       "title": "Crash on startup",
//!       "closed_at": "02/03/24 03:16:17 PM"
//!     }
//!   }
//! }
//! ```
//!
//! # Configuration
//!
//! Configuration is read from `miner.toml` (or `.yml`/`.yaml`/`.json`) in the
//! current directory, or from the path given with `--config`:
//!
//! ```toml
//! repo = "JabRef/jabref"
//! state = "closed"
//! range = [270, 280]
//! output_dir = "output"
//!
//! [fields]
//! issues = ["title", "body", "author", "closed_at", "comments"]
//! pull_requests = ["title", "author", "closed_at"]
//! commits = ["commit_author_name", "commit_date", "commit_message"]
//! ```
//!
//! Only item types listed under `[fields]` are processed. The `range` applies
//! to each of them; for `commits`, the number identifies the pull request
//! whose most recent commit is extracted. The `state` filter selects open
//! pull requests (`"open"`) or merged ones (`"closed"`, which skips pull
//! requests that were closed without being merged).
//!
//! # Rate Limiting
//!
//! GitHub's API quota is tracked from response headers after every call. When
//! the quota runs out, the tool writes a checkpoint, sleeps until the quota
//! window resets, and retries the same item, so long ranges survive multiple
//! quota windows unattended. Supplying a personal access token (via
//! `--github-token` or the `GITHUB_TOKEN` environment variable) raises the
//! quota substantially.
//!
//! # Resuming
//!
//! Re-running with the same configuration is cheap: items whose requested
//! fields are already present in the output document are skipped without an
//! API call. Adding field names to the configuration and re-running fetches
//! just the new fields and merges them into the existing records.
//!
//! # Exit Codes
//!
//! - `0`: all configured ranges completed (items not found upstream are
//!   skipped, not errors)
//! - non-zero: configuration problems, a malformed output document, or a
//!   fetch failure; the last checkpoint is left intact

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Parser, Subcommand};
use repo_miner::Result;

mod commands;

use crate::commands::{InitArgs, RunArgs, ValidateArgs, init_config, run_extraction, validate_config};

const CLAP_STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "repo-miner", version, about)]
#[command(styles = CLAP_STYLES)]
struct Cli {
    #[command(subcommand)]
    command: MinerSubcommand,
}

#[derive(Subcommand, Debug)]
enum MinerSubcommand {
    /// Extract repository metadata over the configured item range
    Run(RunArgs),
    /// Generate a default configuration file
    Init(InitArgs),
    /// Validate a configuration file
    Validate(ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    match &Cli::parse().command {
        MinerSubcommand::Run(run_args) => run_extraction(run_args).await,
        MinerSubcommand::Init(init_args) => init_config(init_args),
        MinerSubcommand::Validate(validate_args) => validate_config(validate_args),
    }
}
