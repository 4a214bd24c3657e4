//! Pool API client
//!
//! This module provides a client for CLI tools and external callers to
//! query a running pool server.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use super::api::{ApiResponse, DevicesResponse, HealthResponse, PoolStatsResponse, WorkflowsResponse};

// ============================================================================
// Client Configuration
// ============================================================================

/// Configuration for the pool client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pool server URL
    pub server_url: String,

    /// Request timeout
    pub timeout: Duration,
}

impl ClientConfig {
    /// Create a new client config
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// Client Errors
// ============================================================================

/// Pool client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to build the HTTP client
    #[error("Client init failed: {0}")]
    InitError(String),

    /// Transport failure
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error envelope
    #[error("Server error: {0}")]
    Api(String),
}

// ============================================================================
// Pool Client
// ============================================================================

/// Client for querying a running pool server
pub struct PoolClient {
    config: ClientConfig,
    http_client: Client,
}

impl PoolClient {
    /// Create a new pool client
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Check server health
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get("/api/health").await
    }

    /// Fetch aggregate pool statistics
    pub async fn pool_stats(&self) -> Result<PoolStatsResponse, ClientError> {
        self.get("/api/pool/stats").await
    }

    /// Fetch the device inventory
    pub async fn devices(&self) -> Result<DevicesResponse, ClientError> {
        self.get("/api/devices").await
    }

    /// Fetch all workflows
    pub async fn workflows(&self) -> Result<WorkflowsResponse, ClientError> {
        self.get("/api/workflows").await
    }

    // Internal: GET a path and unwrap the response envelope
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = format!("{}{}", self.config.server_url.trim_end_matches('/'), path);
        let response: ApiResponse<T> = self
            .http_client
            .get(&url)
            .send()
            .await?
            .json()
            .await?;

        if !response.success {
            return Err(ClientError::Api(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        response
            .data
            .ok_or_else(|| ClientError::Api("empty response".to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config() {
        let config = ClientConfig::new("http://localhost:8080")
            .with_timeout(Duration::from_secs(3));
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_client_creation() {
        let client = PoolClient::new(ClientConfig::new("http://localhost:8080"));
        assert!(client.is_ok());
    }
}
