//! GitHub API boundary: classified HTTP client, item fetcher, repository ids.

pub mod client;
pub mod fetcher;
pub mod repo_id;

pub use client::{ApiCallResult, Client, GITHUB_API_BASE_URL};
pub use fetcher::{FetchOutcome, GithubFetcher, ItemFetcher};
pub use repo_id::RepoId;
