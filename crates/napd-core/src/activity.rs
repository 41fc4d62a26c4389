use async_trait::async_trait;
use digest_auth::AuthContext;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Client, Response, StatusCode};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::snapshot::ActivitySnapshot;

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("401 without a digest challenge")]
    MissingChallenge,
    #[error("digest auth error: {0}")]
    Digest(String),
    #[error("malformed activity body: {0}")]
    Parse(#[from] serde_json::Error),
}

#[async_trait]
pub trait ActivityService: Send + Sync {
    /// True only if a plain TCP connect to the service succeeds.
    async fn is_service_reachable(&self) -> bool;
    /// `None` on any transport, status or parse failure.
    async fn fetch_snapshot(&self) -> Option<ActivitySnapshot>;
}

pub struct TvheadendClient {
    http: Client,
    config: ServiceConfig,
}

impl TvheadendClient {
    pub fn new(config: ServiceConfig) -> Result<Self, ActivityError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// GET the activity endpoint, answering one digest challenge if the
    /// server issues it.
    async fn get_activity(&self) -> Result<Response, ActivityError> {
        let url = self.config.activity_url();
        let first = self.http.get(&url).send().await?;
        if first.status() != StatusCode::UNAUTHORIZED {
            return Ok(first);
        }

        let challenge = first
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or(ActivityError::MissingChallenge)?
            .to_string();

        let mut prompt =
            digest_auth::parse(&challenge).map_err(|e| ActivityError::Digest(e.to_string()))?;
        let context = AuthContext::new(
            self.config.username.as_str(),
            self.config.password.as_str(),
            self.config.activity_path.as_str(),
        );
        let answer = prompt
            .respond(&context)
            .map_err(|e| ActivityError::Digest(e.to_string()))?;

        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, answer.to_header_string())
            .send()
            .await?;
        Ok(response)
    }

    pub async fn try_fetch_snapshot(&self) -> Result<ActivitySnapshot, ActivityError> {
        let response = self.get_activity().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ActivityError::Status(status));
        }
        let body = response.bytes().await?;
        Ok(ActivitySnapshot::from_json(&body)?)
    }
}

#[async_trait]
impl ActivityService for TvheadendClient {
    async fn is_service_reachable(&self) -> bool {
        let addr = (self.config.host.as_str(), self.config.port);
        match timeout(self.config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(err)) => {
                warn!(host = %self.config.host, port = self.config.port, error = %err, "tvheadend connect failed");
                false
            }
            Err(_) => {
                warn!(host = %self.config.host, port = self.config.port, "tvheadend connect timed out");
                false
            }
        }
    }

    async fn fetch_snapshot(&self) -> Option<ActivitySnapshot> {
        match self.try_fetch_snapshot().await {
            Ok(snapshot) => {
                debug!(?snapshot, "activity snapshot");
                Some(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "activity snapshot unavailable");
                None
            }
        }
    }
}
