//! Fetching raw item records from the GitHub REST API.

use crate::Result;
use crate::extract::ItemType;
use crate::extract::rate_limit::RateLimitInfo;
use crate::github::client::{ApiCallResult, Client};
use crate::github::repo_id::RepoId;
use chrono::DateTime;
use ohno::app_err;
use serde_json::Value;

const LOG_TARGET: &str = "    github";

/// Outcome of fetching one item's raw record.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The raw record, with whatever rate limit metadata the response carried.
    Retrieved(Value, Option<RateLimitInfo>),

    /// Quota spent; retry the same item after the reset time.
    RateLimited(RateLimitInfo),

    /// Deleted or inaccessible upstream; skipped, not fatal.
    NotFound(Option<RateLimitInfo>),

    /// Network or server failure; aborts the run.
    Failed(ohno::AppError, Option<RateLimitInfo>),
}

/// The boundary between the walker and the remote service. Test drivers
/// substitute scripted implementations.
pub trait ItemFetcher {
    /// Fetch the raw record for one item.
    fn fetch(&self, item_type: ItemType, number: u64) -> impl Future<Output = FetchOutcome> + Send;

    /// Ask the service for the current quota state.
    fn current_rate_limit(&self) -> impl Future<Output = Result<RateLimitInfo>> + Send;
}

/// Production fetcher backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: Client,
    repo: RepoId,
}

impl GithubFetcher {
    pub fn new(token: Option<&str>, repo: RepoId, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::new(token, base_url)?,
            repo,
        })
    }

    fn repo_url(&self, tail: &str) -> String {
        format!("{}/repos/{}/{}/{tail}", self.client.base_url(), self.repo.owner(), self.repo.name())
    }

    async fn fetch_record(&self, url: &str) -> FetchOutcome {
        match self.client.api_call(url).await {
            ApiCallResult::Success(resp, rate_limit) => match resp.json::<Value>().await {
                Ok(record) => FetchOutcome::Retrieved(record, rate_limit),
                Err(e) => FetchOutcome::Failed(e.into(), rate_limit),
            },
            ApiCallResult::RateLimited(info) => FetchOutcome::RateLimited(info),
            ApiCallResult::NotFound(rate_limit) => FetchOutcome::NotFound(rate_limit),
            ApiCallResult::Failed(e, rate_limit) => FetchOutcome::Failed(e, rate_limit),
        }
    }

    /// The commit record for item #n is the most recent commit on pull
    /// request #n, fetched individually so file-level data is present.
    async fn fetch_commit(&self, number: u64) -> FetchOutcome {
        let (listing, list_rate_limit) =
            match self.fetch_record(&self.repo_url(&format!("pulls/{number}/commits"))).await {
                FetchOutcome::Retrieved(record, rate_limit) => (record, rate_limit),
                other => return other,
            };

        let Some(sha) = listing
            .as_array()
            .and_then(|commits| commits.last())
            .and_then(|commit| commit.get("sha"))
            .and_then(Value::as_str)
        else {
            log::debug!(target: LOG_TARGET, "pull request #{number} has no commits");
            return FetchOutcome::NotFound(list_rate_limit);
        };

        match self.fetch_record(&self.repo_url(&format!("commits/{sha}"))).await {
            FetchOutcome::Retrieved(record, rate_limit) => {
                FetchOutcome::Retrieved(record, rate_limit.or(list_rate_limit))
            }
            other => other,
        }
    }
}

impl ItemFetcher for GithubFetcher {
    async fn fetch(&self, item_type: ItemType, number: u64) -> FetchOutcome {
        log::debug!(target: LOG_TARGET, "Fetching {item_type} #{number} from {}", self.repo);

        match item_type {
            ItemType::Commit => self.fetch_commit(number).await,
            ItemType::Issue => self.fetch_record(&self.repo_url(&format!("issues/{number}"))).await,
            ItemType::PullRequest => self.fetch_record(&self.repo_url(&format!("pulls/{number}"))).await,
        }
    }

    async fn current_rate_limit(&self) -> Result<RateLimitInfo> {
        let url = format!("{}/rate_limit", self.client.base_url());
        match self.client.api_call(&url).await {
            ApiCallResult::Success(resp, _) => {
                let body: Value = resp.json().await?;

                let remaining = body
                    .pointer("/resources/core/remaining")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| app_err!("rate limit response has no core remaining count"))?;
                let reset_timestamp = body
                    .pointer("/resources/core/reset")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| app_err!("rate limit response has no core reset time"))?;
                let reset_at = DateTime::from_timestamp(reset_timestamp, 0)
                    .ok_or_else(|| app_err!("rate limit reset time {reset_timestamp} is out of range"))?;

                Ok(RateLimitInfo {
                    remaining: usize::try_from(remaining).unwrap_or(usize::MAX),
                    reset_at,
                })
            }
            ApiCallResult::RateLimited(info) => Ok(info),
            ApiCallResult::NotFound(_) => Err(app_err!("rate limit endpoint not found")),
            ApiCallResult::Failed(e, _) => Err(e),
        }
    }
}
