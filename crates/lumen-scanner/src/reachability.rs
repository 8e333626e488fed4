use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;

use lumen_core::{ReachabilityCheck, ReachabilityError};

const USER_AGENT: &str = concat!("lumen-scanner/", env!("CARGO_PKG_VERSION"));

/// Checks a target with a bounded GET. Any transport error or a status of 400
/// or above counts as unreachable.
#[derive(Debug, Clone)]
pub struct HttpReachabilityChecker {
    client: reqwest::Client,
}

impl HttpReachabilityChecker {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for reachability checks")?;
        Ok(Self { client })
    }
}

/// Accept only absolute http(s) URLs that name a host.
pub fn validate_target(raw_url: &str) -> Result<Url, ReachabilityError> {
    let url = Url::parse(raw_url).map_err(|e| ReachabilityError::InvalidUrl(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ReachabilityError::UnsupportedScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ReachabilityError::MissingHost);
    }

    Ok(url)
}

#[async_trait]
impl ReachabilityCheck for HttpReachabilityChecker {
    #[tracing::instrument(skip(self))]
    async fn check(&self, url: &str) -> Result<(), ReachabilityError> {
        let target = validate_target(url)?;

        let mut response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| ReachabilityError::Request(e.to_string()))?;

        let status = response.status();
        // Discard the body a chunk at a time so the connection can be reused.
        while let Ok(Some(_)) = response.chunk().await {}

        if status.as_u16() >= 400 {
            return Err(ReachabilityError::HttpStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        tracing::debug!(status = status.as_u16(), "Target reachable");
        Ok(())
    }
}
