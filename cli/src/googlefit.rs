use anyhow::{Context, Result, bail};
use async_trait::async_trait;

use fitpulse_core::googlefit::{AggregateRequest, AggregateResponse, response_to_buckets};
use fitpulse_core::models::UserId;
use fitpulse_core::provider::{ActivityBucket, ActivityProvider};

const AGGREGATE_URL: &str = "https://www.googleapis.com/fitness/v1/users/me/dataset:aggregate";

/// Google Fit aggregate client using an already-issued access token.
pub struct GoogleFitClient {
    client: reqwest::Client,
    access_token: String,
    url: String,
}

impl GoogleFitClient {
    pub fn new(access_token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "fitpulse-cli/{} (fitness tracker)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(20))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            access_token,
            url: AGGREGATE_URL.to_string(),
        })
    }
}

#[async_trait]
impl ActivityProvider for GoogleFitClient {
    async fn fetch_aggregated_activity(
        &self,
        user: &UserId,
        start_ms: i64,
        end_ms: i64,
        bucket_seconds: u32,
    ) -> Result<Vec<ActivityBucket>> {
        let body = AggregateRequest::steps_calories_distance(start_ms, end_ms, bucket_seconds);
        tracing::debug!(%user, start_ms, end_ms, bucket_seconds, "requesting google fit aggregate");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .context("Failed to reach Google Fit API")?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            bail!("Google Fit API returned {status}: {}", detail.trim());
        }

        let data: AggregateResponse = resp
            .json()
            .await
            .context("Failed to parse Google Fit aggregate response")?;
        Ok(response_to_buckets(&data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "hits the live Google Fit API; needs FITPULSE_GOOGLE_FIT_TOKEN"]
    async fn test_live_aggregate() {
        let token = std::env::var("FITPULSE_GOOGLE_FIT_TOKEN").unwrap();
        let client = GoogleFitClient::new(token).unwrap();
        let end = chrono::Utc::now().timestamp_millis();
        let buckets = client
            .fetch_aggregated_activity(&UserId::parse("me").unwrap(), end - 3_600_000, end, 300)
            .await
            .unwrap();
        assert!(buckets.iter().all(|b| b.steps >= 0));
    }
}
