// GitHub API HTTP client.
// Handles authentication, throttling responses, endpoint backoff, and request/response processing.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{
    Client, Response, StatusCode,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT},
};

use crate::cache::BackoffTracker;
use crate::error::{RepoBarError, Result};

const GITHUB_API_VERSION: &str = "2022-11-28";
const DEFAULT_THROTTLE_SECS: i64 = 60;

/// GitHub API client with authentication and per-endpoint backoff.
pub struct GitHubClient {
    client: Client,
    api_base: String,
    backoff: Arc<BackoffTracker>,
}

impl GitHubClient {
    /// Create a client for `api_host` with the given token.
    pub fn new(token: &str, api_host: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();

        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| RepoBarError::Other(e.to_string()))?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static(GITHUB_API_VERSION),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repobar"));

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self {
            client,
            api_base: api_host.trim_end_matches('/').to_string(),
            backoff: Arc::new(BackoffTracker::new()),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn backoff(&self) -> &Arc<BackoffTracker> {
        &self.backoff
    }

    /// GraphQL endpoint that pairs with the REST base.
    pub fn graphql_url(&self) -> String {
        match self.api_base.strip_suffix("/api/v3") {
            Some(host) => format!("{}/api/graphql", host),
            None => format!("{}/graphql", self.api_base),
        }
    }

    /// Make a GET request to the GitHub API.
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        self.get_with_params::<[(&str, &str)]>(endpoint, &[]).await
    }

    /// Make a GET request with query parameters.
    pub async fn get_with_params<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        params: &T,
    ) -> Result<Response> {
        let url = format!("{}{}", self.api_base, endpoint);
        self.ensure_not_cooling(&url)?;

        log::debug!("GET {}", url);
        let response = self.client.get(&url).query(params).send().await?;

        self.check_response(&url, response).await
    }

    /// POST a GraphQL query and return the `data` object.
    pub async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = self.graphql_url();
        self.ensure_not_cooling(&url)?;

        log::debug!("POST {}", url);
        let body = serde_json::json!({ "query": query, "variables": variables });
        let response = self.client.post(&url).json(&body).send().await?;

        let response = self.check_response(&url, response).await?;
        let mut payload: serde_json::Value = response.json().await?;

        if let Some(message) = payload
            .get("errors")
            .and_then(|errors| errors.get(0))
            .and_then(|error| error.get("message"))
            .and_then(|message| message.as_str())
        {
            return Err(RepoBarError::Other(format!("GraphQL: {}", message)));
        }

        Ok(payload
            .get_mut("data")
            .map(serde_json::Value::take)
            .unwrap_or(serde_json::Value::Null))
    }

    fn ensure_not_cooling(&self, url: &str) -> Result<()> {
        match self.backoff.cooldown(url, Utc::now()) {
            Some(until) => {
                log::debug!("Skipping {} (cooling down until {})", url, until);
                Err(RepoBarError::CoolingDown {
                    url: url.to_string(),
                    until,
                })
            }
            None => Ok(()),
        }
    }

    /// Check response status and convert errors.
    async fn check_response(&self, url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::UNAUTHORIZED => Err(RepoBarError::Unauthorized),
            StatusCode::NOT_FOUND => Err(RepoBarError::NotFound(url.to_string())),
            StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                match throttle_deadline(status, response.headers(), Utc::now()) {
                    Some(reset_at) => {
                        log::warn!("Rate limited on {} until {}", url, reset_at);
                        self.backoff.set_cooldown(url, reset_at);
                        Err(RepoBarError::RateLimited { reset_at })
                    }
                    None => Err(RepoBarError::Forbidden(
                        response.text().await.unwrap_or_default(),
                    )),
                }
            }
            status => Err(RepoBarError::Other(format!(
                "HTTP {}: {}",
                status,
                response.text().await.unwrap_or_default()
            ))),
        }
    }
}

fn header_u64(headers: &HeaderMap, name: impl reqwest::header::AsHeaderName) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// When a 403/429 response signals throttling, the time the endpoint reopens.
fn throttle_deadline(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if header_u64(headers, "x-ratelimit-remaining") == Some(0) {
        let reset = header_u64(headers, "x-ratelimit-reset")
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));
        return Some(reset.unwrap_or(now + chrono::Duration::seconds(DEFAULT_THROTTLE_SECS)));
    }
    if let Some(secs) = header_u64(headers, RETRY_AFTER) {
        return Some(now + chrono::Duration::seconds(secs as i64));
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(now + chrono::Duration::seconds(DEFAULT_THROTTLE_SECS));
    }
    None
}
