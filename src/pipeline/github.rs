//! GitHub contribution calendar source
//!
//! Fetches the daily contribution calendar of a GitHub login through the
//! GraphQL API.
//!
//! ## API Reference
//!
//! Endpoint: https://api.github.com/graphql
//! Query: `user(login).contributionsCollection(from, to).contributionCalendar`
//!
//! GitHub caps one `contributionsCollection` at a year, which is also the
//! longest lookback this source accepts.

use super::source::{ActivitySource, FetchError};
use super::types::{ActivityCalendar, ActivityDay};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// Longest lookback GitHub serves in one request
pub const MAX_LOOKBACK_DAYS: u32 = 365;

const CONTRIBUTIONS_QUERY: &str = r#"
query($login: String!, $from: DateTime!, $to: DateTime!) {
  user(login: $login) {
    contributionsCollection(from: $from, to: $to) {
      contributionCalendar {
        totalContributions
        weeks {
          contributionDays {
            date
            contributionCount
          }
        }
      }
    }
  }
}
"#;

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: QueryVariables<'a>,
}

#[derive(Debug, Serialize)]
struct QueryVariables<'a> {
    login: &'a str,
    from: String,
    to: String,
}

/// GraphQL response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlResponse {
    pub data: Option<ResponseData>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseData {
    pub user: Option<GithubUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubUser {
    pub contributions_collection: ContributionsCollection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionsCollection {
    pub contribution_calendar: ContributionCalendar,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionCalendar {
    pub total_contributions: i64,
    pub weeks: Vec<ContributionWeek>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionWeek {
    pub contribution_days: Vec<ContributionDay>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionDay {
    pub date: NaiveDate,
    pub contribution_count: i64,
}

/// Turn a GraphQL response into an activity calendar
///
/// A null user (unknown login) is `NotFound`; any other GraphQL error is
/// `Upstream`.
pub fn calendar_from_response(
    handle: &str,
    response: GraphQlResponse,
) -> Result<ActivityCalendar, FetchError> {
    if let Some(first) = response.errors.first() {
        if first.error_type.as_deref() == Some("NOT_FOUND") {
            return Err(FetchError::NotFound(handle.to_string()));
        }
        return Err(FetchError::Upstream(first.message.clone()));
    }

    let calendar = response
        .data
        .and_then(|data| data.user)
        .map(|user| user.contributions_collection.contribution_calendar)
        .ok_or_else(|| FetchError::NotFound(handle.to_string()))?;

    let days = calendar
        .weeks
        .into_iter()
        .flat_map(|week| week.contribution_days)
        .map(|day| ActivityDay::new(day.date, day.contribution_count.max(0)))
        .collect();

    Ok(ActivityCalendar {
        total_count: calendar.total_contributions,
        days,
    })
}

/// `ActivitySource` backed by the GitHub GraphQL API
pub struct GithubContributionSource {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    lookback_days: u32,
}

impl GithubContributionSource {
    /// Create a source with a 10s request timeout
    ///
    /// `lookback_days` is clamped to the one-year GitHub limit.
    pub fn new(token: impl Into<String>, lookback_days: u32) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("activity_pulse/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: GITHUB_GRAPHQL_URL.to_string(),
            token: token.into(),
            lookback_days: lookback_days.clamp(1, MAX_LOOKBACK_DAYS),
        })
    }

    /// Point the source at a different GraphQL endpoint (GitHub Enterprise)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn lookback_days(&self) -> u32 {
        self.lookback_days
    }

    fn query_range(&self, now: DateTime<Utc>) -> (String, String) {
        let from = now - ChronoDuration::days(i64::from(self.lookback_days));
        (from.to_rfc3339(), now.to_rfc3339())
    }

    async fn request(&self, handle: &str) -> Result<ActivityCalendar, FetchError> {
        let (from, to) = self.query_range(Utc::now());
        let body = GraphQlRequest {
            query: CONTRIBUTIONS_QUERY,
            variables: QueryVariables {
                login: handle,
                from,
                to,
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Upstream(format!(
                "GitHub API error: {}",
                response.status()
            )));
        }

        let parsed: GraphQlResponse = response.json().await?;
        calendar_from_response(handle, parsed)
    }
}

#[async_trait]
impl ActivitySource for GithubContributionSource {
    async fn fetch(
        &self,
        handle: &str,
        cancel: &CancellationToken,
    ) -> Result<ActivityCalendar, FetchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.request(handle) => result,
        }
    }

    fn source_name(&self) -> &'static str {
        "github"
    }
}
