//! Sequential walk over a numbered item range, surviving quota exhaustion.
//!
//! The walker is the single writer of the merged document. For each item it
//! consults the store for missing fields, fetches at most one record, merges
//! the resolved values, and advances. Quota exhaustion suspends the walk
//! (checkpoint, timed sleep, retry of the same item) instead of failing it.

use crate::Result;
use crate::config::StateFilter;
use crate::extract::ItemType;
use crate::extract::checkpoint::CheckpointWriter;
use crate::extract::field_resolver;
use crate::extract::merge_store::MergeStore;
use crate::extract::rate_limit::RateLimitGuard;
use crate::github::fetcher::{FetchOutcome, ItemFetcher};
use chrono::{Local, TimeDelta, Utc};
use ohno::EnrichableExt;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "    walker";

/// Inclusive range of item numbers, configured as `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u64; 2]", into = "[u64; 2]")]
pub struct RangeSpec {
    pub low: u64,
    pub high: u64,
}

impl From<[u64; 2]> for RangeSpec {
    fn from(bounds: [u64; 2]) -> Self {
        Self { low: bounds[0], high: bounds[1] }
    }
}

impl From<RangeSpec> for [u64; 2] {
    fn from(range: RangeSpec) -> Self {
        [range.low, range.high]
    }
}

/// Where the walker is in its lifecycle for one item type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkerState {
    #[default]
    Idle,
    Iterating,
    /// Waiting out a quota window; the cursor has not advanced.
    Suspended,
    Complete,
}

/// Counts of how each item in the range was handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub fetched: u64,
    pub already_complete: u64,
    pub not_found: u64,
    pub filtered: u64,
}

impl WalkStats {
    pub fn accumulate(&mut self, other: Self) {
        self.fetched += other.fetched;
        self.already_complete += other.already_complete;
        self.not_found += other.not_found;
        self.filtered += other.filtered;
    }
}

/// Walks one item type over the configured range.
#[derive(Debug)]
pub struct RangeWalker<'a, F> {
    fetcher: &'a F,
    store: &'a mut MergeStore,
    guard: &'a mut RateLimitGuard,
    checkpoint: &'a CheckpointWriter,
    pr_state: StateFilter,
    state: WalkerState,
}

impl<'a, F: ItemFetcher> RangeWalker<'a, F> {
    pub fn new(
        fetcher: &'a F,
        store: &'a mut MergeStore,
        guard: &'a mut RateLimitGuard,
        checkpoint: &'a CheckpointWriter,
        pr_state: StateFilter,
    ) -> Self {
        Self {
            fetcher,
            store,
            guard,
            checkpoint,
            pr_state,
            state: WalkerState::Idle,
        }
    }

    pub const fn state(&self) -> WalkerState {
        self.state
    }

    /// Walk the inclusive range, fetching every item that still has missing
    /// fields, and flush a final checkpoint once the range completes.
    pub async fn walk(&mut self, item_type: ItemType, range: RangeSpec, requested: &[String]) -> Result<WalkStats> {
        self.state = WalkerState::Iterating;
        log::info!(target: LOG_TARGET, "Extracting {item_type} data for items #{} through #{}", range.low, range.high);

        let mut stats = WalkStats::default();
        let mut cursor = range.low;
        while cursor <= range.high {
            let missing = self.store.missing_fields(item_type, cursor, requested);
            if missing.is_empty() {
                log::debug!(target: LOG_TARGET, "{item_type} #{cursor} already fully collected, skipping");
                stats.already_complete += 1;
                cursor += 1;
                continue;
            }

            // Check before calling so a known-spent quota doesn't burn a
            // doomed request.
            if self.guard.is_exhausted(Utc::now()) {
                self.suspend(item_type, cursor).await?;
            }

            match self.fetcher.fetch(item_type, cursor).await {
                FetchOutcome::Retrieved(record, rate_limit) => {
                    self.guard.observe(rate_limit);

                    if item_type == ItemType::PullRequest && !selected_by_filter(self.pr_state, &record) {
                        log::debug!(target: LOG_TARGET, "pull request #{cursor} does not match the '{:?}' state filter, skipping",
                            self.pr_state);
                        stats.filtered += 1;
                        cursor += 1;
                        continue;
                    }

                    for field in &missing {
                        if let Some(value) = field_resolver::resolve(item_type, field, &record) {
                            self.store.put(item_type, cursor, field, value);
                        }
                    }

                    stats.fetched += 1;
                    cursor += 1;
                }

                FetchOutcome::RateLimited(info) => {
                    // The cursor stays put so the same item is fetched again
                    // once the quota window resets.
                    self.guard.mark_exhausted(info);
                    self.suspend(item_type, cursor).await?;
                }

                FetchOutcome::NotFound(rate_limit) => {
                    self.guard.observe(rate_limit);
                    log::info!(target: LOG_TARGET, "{item_type} #{cursor} not found upstream, skipping");
                    stats.not_found += 1;
                    cursor += 1;
                }

                FetchOutcome::Failed(e, rate_limit) => {
                    self.guard.observe(rate_limit);
                    return Err(e.enrich_with(|| format!("could not fetch {item_type} #{cursor}")));
                }
            }
        }

        self.state = WalkerState::Complete;
        self.checkpoint.flush(self.store)?;

        log::info!(target: LOG_TARGET,
            "Completed {item_type} range: {} fetched, {} already collected, {} not found, {} filtered",
            stats.fetched, stats.already_complete, stats.not_found, stats.filtered);

        Ok(stats)
    }

    /// Checkpoint everything collected so far, then wait out the quota
    /// window. A second consecutive exhaustion just repeats this cycle.
    async fn suspend(&mut self, item_type: ItemType, cursor: u64) -> Result<()> {
        self.state = WalkerState::Suspended;
        self.checkpoint.flush(self.store)?;

        let now = Utc::now();
        let wait = self.guard.wait_duration(now);
        let resume_at = now + TimeDelta::from_std(wait).unwrap_or_else(|_ignored| TimeDelta::zero());
        log::warn!(target: LOG_TARGET,
            "Rate limit exhausted at {item_type} #{cursor}; checkpoint written, sleeping until {}",
            resume_at.with_timezone(&Local).format("%T"));

        tokio::time::sleep(wait).await;

        self.guard.assume_reset();
        self.state = WalkerState::Iterating;
        Ok(())
    }
}

/// Whether a pull request record matches the configured state filter:
/// `open` selects open pull requests, `closed` selects merged ones (a merged
/// pull request is always closed).
fn selected_by_filter(pr_state: StateFilter, record: &serde_json::Value) -> bool {
    match pr_state {
        StateFilter::Open => record.get("state").and_then(serde_json::Value::as_str) == Some("open"),
        StateFilter::Closed => field_resolver::is_merged(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::rate_limit::RateLimitInfo;
    use serde_json::{Value, json};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Replays scripted outcomes per (item type, number); anything
    /// unscripted reports not found.
    #[derive(Default)]
    struct ScriptedFetcher {
        script: Mutex<HashMap<(ItemType, u64), VecDeque<FetchOutcome>>>,
        calls: AtomicU64,
    }

    impl ScriptedFetcher {
        fn push(&self, item_type: ItemType, number: u64, outcome: FetchOutcome) {
            self.script
                .lock()
                .unwrap()
                .entry((item_type, number))
                .or_default()
                .push_back(outcome);
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ItemFetcher for ScriptedFetcher {
        async fn fetch(&self, item_type: ItemType, number: u64) -> FetchOutcome {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .get_mut(&(item_type, number))
                .and_then(VecDeque::pop_front)
                .unwrap_or(FetchOutcome::NotFound(None))
        }

        async fn current_rate_limit(&self) -> Result<RateLimitInfo> {
            Ok(RateLimitInfo { remaining: 5000, reset_at: Utc::now() })
        }
    }

    fn issue_record(number: u64) -> Value {
        json!({
            "number": number,
            "title": format!("Issue {number}"),
            "state": "closed",
        })
    }

    fn plenty() -> Option<RateLimitInfo> {
        Some(RateLimitInfo { remaining: 5000, reset_at: Utc::now() + TimeDelta::hours(1) })
    }

    struct Fixture {
        store: MergeStore,
        guard: RateLimitGuard,
        checkpoint: CheckpointWriter,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            store: MergeStore::new(),
            guard: RateLimitGuard::new(),
            checkpoint: CheckpointWriter::new(dir.path(), "jabref"),
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let fetcher = ScriptedFetcher::default();
        for number in 270..=280 {
            fetcher.push(ItemType::Issue, number, FetchOutcome::Retrieved(issue_record(number), plenty()));
        }

        let mut fx = fixture();
        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 280 }, &["title".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.fetched, 11);
        assert_eq!(walker.state(), WalkerState::Complete);
        assert_eq!(fx.store.document().item_count(ItemType::Issue), 11);
        assert!(fx.store.has_field(ItemType::Issue, 270, "title"));
        assert!(fx.store.has_field(ItemType::Issue, 280, "title"));
    }

    #[tokio::test]
    async fn test_fully_collected_items_skip_the_fetch() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(ItemType::Issue, 271, FetchOutcome::Retrieved(issue_record(271), plenty()));

        let mut fx = fixture();
        fx.store.put(ItemType::Issue, 270, "number", json!(270));
        fx.store.put(ItemType::Issue, 270, "title", json!("Issue 270"));

        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 271 }, &["title".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.already_complete, 1);
        assert_eq!(stats.fetched, 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_skips_and_completes() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(ItemType::Issue, 270, FetchOutcome::Retrieved(issue_record(270), plenty()));
        fetcher.push(ItemType::Issue, 272, FetchOutcome::Retrieved(issue_record(272), plenty()));

        let mut fx = fixture();
        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 272 }, &[])
            .await
            .unwrap();

        assert_eq!(stats.fetched, 2);
        assert_eq!(stats.not_found, 1);
        assert!(fx.store.document().record(ItemType::Issue, 271).is_none());
    }

    #[tokio::test]
    async fn test_closed_unmerged_pull_request_is_filtered() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(
            ItemType::PullRequest,
            270,
            FetchOutcome::Retrieved(json!({ "number": 270, "state": "closed", "merged_at": null }), plenty()),
        );
        fetcher.push(
            ItemType::PullRequest,
            271,
            FetchOutcome::Retrieved(
                json!({ "number": 271, "state": "closed", "merged_at": "2024-01-02T03:04:05Z" }),
                plenty(),
            ),
        );

        let mut fx = fixture();
        let mut walker = RangeWalker::new(
            &fetcher,
            &mut fx.store,
            &mut fx.guard,
            &fx.checkpoint,
            StateFilter::Closed,
        );
        let stats = walker
            .walk(ItemType::PullRequest, RangeSpec { low: 270, high: 271 }, &[])
            .await
            .unwrap();

        assert_eq!(stats.filtered, 1);
        assert_eq!(stats.fetched, 1);
        assert!(fx.store.document().record(ItemType::PullRequest, 270).is_none());
        assert_eq!(
            fx.store.document().record(ItemType::PullRequest, 271).unwrap()["merged"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_open_filter_skips_closed_pull_requests() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(
            ItemType::PullRequest,
            270,
            FetchOutcome::Retrieved(json!({ "number": 270, "state": "closed", "merged_at": null }), plenty()),
        );
        fetcher.push(
            ItemType::PullRequest,
            271,
            FetchOutcome::Retrieved(
                json!({ "number": 271, "state": "closed", "merged_at": "2024-01-02T03:04:05Z" }),
                plenty(),
            ),
        );
        fetcher.push(
            ItemType::PullRequest,
            272,
            FetchOutcome::Retrieved(json!({ "number": 272, "state": "open" }), plenty()),
        );

        let mut fx = fixture();
        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Open);
        let stats = walker
            .walk(ItemType::PullRequest, RangeSpec { low: 270, high: 272 }, &[])
            .await
            .unwrap();

        // Closed pull requests are skipped whether merged or not; only the
        // open one is collected.
        assert_eq!(stats.filtered, 2);
        assert_eq!(stats.fetched, 1);
        assert!(fx.store.document().record(ItemType::PullRequest, 270).is_none());
        assert!(fx.store.document().record(ItemType::PullRequest, 271).is_none());
        assert!(fx.store.document().record(ItemType::PullRequest, 272).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_checkpoints_then_retries_same_item() {
        let reset_at = Utc::now() + TimeDelta::seconds(30);
        let fetcher = ScriptedFetcher::default();
        for number in 270..=274 {
            fetcher.push(ItemType::Issue, number, FetchOutcome::Retrieved(issue_record(number), plenty()));
        }
        fetcher.push(
            ItemType::Issue,
            275,
            FetchOutcome::RateLimited(RateLimitInfo { remaining: 0, reset_at }),
        );
        for number in 275..=280 {
            fetcher.push(ItemType::Issue, number, FetchOutcome::Retrieved(issue_record(number), plenty()));
        }

        let mut fx = fixture();
        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 280 }, &["title".to_string()])
            .await
            .unwrap();

        // All 11 items land despite the mid-range exhaustion, and #275 cost
        // one extra call for the retry.
        assert_eq!(stats.fetched, 11);
        assert_eq!(fetcher.calls(), 12);

        // The checkpoint written before sleeping held exactly #270..=#274;
        // the final flush then overwrote it with the full range.
        let reloaded = fx.checkpoint.load().unwrap().unwrap();
        assert_eq!(reloaded.item_count(ItemType::Issue), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_exhaustions_repeat_the_suspend_cycle() {
        let fetcher = ScriptedFetcher::default();
        for number in 270..=274 {
            fetcher.push(ItemType::Issue, number, FetchOutcome::Retrieved(issue_record(number), plenty()));
        }

        // The quota window resets, the retry is immediately rejected again,
        // and the walker just suspends a second time.
        for _attempt in 0..2 {
            fetcher.push(
                ItemType::Issue,
                275,
                FetchOutcome::RateLimited(RateLimitInfo {
                    remaining: 0,
                    reset_at: Utc::now() + TimeDelta::seconds(30),
                }),
            );
        }
        for number in 275..=280 {
            fetcher.push(ItemType::Issue, number, FetchOutcome::Retrieved(issue_record(number), plenty()));
        }

        let mut fx = fixture();
        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 280 }, &["title".to_string()])
            .await
            .unwrap();

        assert_eq!(stats.fetched, 11);
        assert_eq!(fetcher.calls(), 13);

        let reloaded = fx.checkpoint.load().unwrap().unwrap();
        assert_eq!(reloaded.item_count(ItemType::Issue), 11);
        assert!(fx.store.has_field(ItemType::Issue, 275, "title"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preflight_waits_when_quota_already_spent() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(ItemType::Issue, 270, FetchOutcome::Retrieved(issue_record(270), plenty()));

        let mut fx = fixture();
        fx.guard.mark_exhausted(RateLimitInfo {
            remaining: 0,
            reset_at: Utc::now() + TimeDelta::seconds(30),
        });

        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let stats = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 270 }, &[])
            .await
            .unwrap();

        assert_eq!(stats.fetched, 1);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_aborts_with_checkpoint_intact() {
        let fetcher = ScriptedFetcher::default();
        fetcher.push(ItemType::Issue, 270, FetchOutcome::Retrieved(issue_record(270), plenty()));
        fetcher.push(
            ItemType::Issue,
            271,
            FetchOutcome::Failed(ohno::app_err!("connection reset"), None),
        );

        let mut fx = fixture();

        // A prior checkpoint exists before the failing walk.
        fx.store.put(ItemType::Issue, 100, "number", json!(100));
        fx.checkpoint.flush(&fx.store).unwrap();

        let mut walker =
            RangeWalker::new(&fetcher, &mut fx.store, &mut fx.guard, &fx.checkpoint, StateFilter::Closed);
        let result = walker
            .walk(ItemType::Issue, RangeSpec { low: 270, high: 272 }, &[])
            .await;

        assert!(result.is_err());
        let on_disk = fx.checkpoint.load().unwrap().unwrap();
        assert_eq!(on_disk.item_count(ItemType::Issue), 1);
    }
}
