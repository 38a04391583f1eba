//! Minimal GitHub REST client with classified call results.

use crate::extract::rate_limit::RateLimitInfo;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

/// Default base URL for the GitHub REST API.
pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// Result of a single API call.
#[derive(Debug)]
pub enum ApiCallResult {
    /// Request succeeded, with whatever rate limit metadata the response carried.
    Success(reqwest::Response, Option<RateLimitInfo>),

    /// Rate limited; retry after the reset time.
    RateLimited(RateLimitInfo),

    /// The requested resource was not found (404).
    NotFound(Option<RateLimitInfo>),

    /// Request failed; should NOT be retried.
    Failed(ohno::AppError, Option<RateLimitInfo>),
}

/// GitHub API client with optional authentication.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(token: Option<&str>, base_url: impl Into<String>) -> crate::Result<Self> {
        use reqwest::header::{AUTHORIZATION, HeaderValue};

        let mut builder = reqwest::Client::builder().user_agent("repo-miner");

        if let Some(t) = token {
            let mut auth_val = HeaderValue::from_str(&format!("token {t}"))?;
            auth_val.set_sensitive(true);

            let mut headers = HeaderMap::new();
            let _ = headers.insert(AUTHORIZATION, auth_val);

            builder = builder.default_headers(headers);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: base_url.into(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make an API call and classify the result.
    pub async fn api_call(&self, url: &str) -> ApiCallResult {
        let resp = match self.http.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ApiCallResult::Failed(e.into(), None),
        };

        // Rate limit metadata rides on every response, success or not.
        let rate_limit = extract_rate_limit_from_headers(resp.headers());

        let status = resp.status();
        if status.is_success() {
            return ApiCallResult::Success(resp, rate_limit);
        }

        let status_code = status.as_u16();
        if matches!(status_code, 403 | 429) {
            // Headers should say when the window resets; default to an hour
            // out when they don't.
            let rate_limit = rate_limit.unwrap_or_else(|| RateLimitInfo {
                remaining: 0,
                reset_at: Utc::now() + chrono::Duration::hours(1),
            });
            return ApiCallResult::RateLimited(rate_limit);
        }

        if status_code == 404 {
            return ApiCallResult::NotFound(rate_limit);
        }

        let error = resp.error_for_status().expect_err("status is not successful at this point");
        ApiCallResult::Failed(error.into(), rate_limit)
    }
}

/// Extract rate limit information from API response headers.
fn extract_rate_limit_from_headers(headers: &HeaderMap) -> Option<RateLimitInfo> {
    let remaining = headers.get("x-ratelimit-remaining")?.to_str().ok()?.parse::<usize>().ok()?;

    let reset_timestamp = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse::<i64>().ok()?;

    let reset_at = DateTime::from_timestamp(reset_timestamp, 0)?;

    Some(RateLimitInfo { remaining, reset_at })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_extract_rate_limit_valid_headers() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("1700000000"));

        let info = extract_rate_limit_from_headers(&headers).unwrap();
        assert_eq!(info.remaining, 42);
        assert_eq!(info.reset_at, DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_extract_rate_limit_missing_headers() {
        assert!(extract_rate_limit_from_headers(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("42"));
        assert!(extract_rate_limit_from_headers(&headers).is_none());
    }

    #[test]
    fn test_extract_rate_limit_garbage_values() {
        let mut headers = HeaderMap::new();
        let _ = headers.insert("x-ratelimit-remaining", HeaderValue::from_static("lots"));
        let _ = headers.insert("x-ratelimit-reset", HeaderValue::from_static("soon"));

        assert!(extract_rate_limit_from_headers(&headers).is_none());
    }
}
