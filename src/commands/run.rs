use camino::Utf8PathBuf;
use clap::Parser;
use repo_miner::Result;
use repo_miner::config::Config;
use repo_miner::extract::{CheckpointWriter, MergeStore, RangeWalker, RateLimitGuard, WalkStats};
use repo_miner::github::{GithubFetcher, ItemFetcher};

use crate::commands::common::{CommonArgs, init_logging, report_warnings};

const LOG_TARGET: &str = "       run";

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run the extraction over every configured item type.
pub async fn run_extraction(args: &RunArgs) -> Result<()> {
    init_logging(args.common.log_level);

    let base_path = Utf8PathBuf::from(".");
    let (mut config, warnings) = Config::load(&base_path, args.common.config.as_ref())?;
    report_warnings(&warnings);

    if let Some(dir) = &args.common.output_dir {
        config.output_dir = dir.as_std_path().to_path_buf();
    }

    let repo = config.repo_id()?;
    let checkpoint = CheckpointWriter::new(&config.output_dir, repo.name());

    let mut store = match checkpoint.load()? {
        Some(document) => {
            log::info!(target: LOG_TARGET, "Resuming from existing output document '{}'", checkpoint.path().display());
            MergeStore::from_document(document)
        }
        None => MergeStore::new(),
    };

    let fetcher = GithubFetcher::new(args.common.github_token.as_deref(), repo.clone(), &args.common.api_url)?;

    let mut guard = RateLimitGuard::new();
    match fetcher.current_rate_limit().await {
        Ok(info) => {
            log::info!(target: LOG_TARGET, "GitHub reports {} API calls remaining", info.remaining);
            guard.observe(Some(info));
        }
        Err(e) => log::debug!(target: LOG_TARGET, "Could not query rate limit state: {e}"),
    }

    let mut totals = WalkStats::default();
    for (item_type, requested) in &config.fields {
        let mut walker = RangeWalker::new(&fetcher, &mut store, &mut guard, &checkpoint, config.state);
        let stats = walker.walk(*item_type, config.range, requested).await?;
        totals.accumulate(stats);
    }

    log::info!(target: LOG_TARGET,
        "Extraction complete for {repo}: {} items fetched, {} already collected, {} not found, {} filtered; output written to '{}'",
        totals.fetched, totals.already_complete, totals.not_found, totals.filtered,
        checkpoint.path().display());

    Ok(())
}
