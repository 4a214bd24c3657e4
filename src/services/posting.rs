//! Content-posting collaborator
//!
//! Publishes one piece of content through a platform account. The simulated
//! implementation returns platform-shaped post URLs and can inject a
//! configurable failure rate.

use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::ServiceError;
use crate::registry::Platform;

// ============================================================================
// Contract
// ============================================================================

/// Content to publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostContent {
    /// Media URL or asset reference
    pub media_url: String,

    /// Caption text
    pub caption: String,

    /// Hashtags without the leading '#'
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Result of one post attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostReceipt {
    /// Whether the platform accepted the post
    pub success: bool,

    /// URL of the published post
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,

    /// Platform-side rejection reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// External posting backend
#[async_trait]
pub trait PostingService: Send + Sync {
    /// Publish content through a platform account
    async fn post_content(
        &self,
        platform: Platform,
        account_id: &str,
        content: &PostContent,
    ) -> Result<PostReceipt, ServiceError>;
}

// ============================================================================
// Simulated Implementation
// ============================================================================

/// Seeded simulated posting backend
pub struct SimulatedPostingService {
    rng: Mutex<ChaCha8Rng>,
    failure_rate: f64,
    counter: Mutex<u64>,
}

impl SimulatedPostingService {
    /// Create a simulated service with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            failure_rate: 0.0,
            counter: Mutex::new(0),
        }
    }

    /// Reject a fraction of posts (0.0 - 1.0)
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn post_url(platform: Platform, account_id: &str, post_number: u64) -> String {
        let handle = account_id.trim_start_matches('@');
        match platform {
            Platform::Tiktok => {
                format!("https://www.tiktok.com/@{handle}/video/72{post_number:010}")
            }
            Platform::Instagram => format!("https://www.instagram.com/reel/B{post_number:09}/"),
            Platform::Youtube => format!("https://youtube.com/shorts/v{post_number:09}"),
        }
    }
}

#[async_trait]
impl PostingService for SimulatedPostingService {
    async fn post_content(
        &self,
        platform: Platform,
        account_id: &str,
        content: &PostContent,
    ) -> Result<PostReceipt, ServiceError> {
        let mut rng = self.rng.lock().await;
        if self.failure_rate > 0.0 && rng.gen_bool(self.failure_rate) {
            return Ok(PostReceipt {
                success: false,
                post_url: None,
                error: Some("rate limited by platform".to_string()),
            });
        }
        drop(rng);

        let mut counter = self.counter.lock().await;
        *counter += 1;
        let url = Self::post_url(platform, account_id, *counter);

        tracing::debug!(
            platform = %platform,
            account = %account_id,
            caption_len = content.caption.len(),
            tags = content.tags.len(),
            url = %url,
            "Post published"
        );
        Ok(PostReceipt {
            success: true,
            post_url: Some(url),
            error: None,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> PostContent {
        PostContent {
            media_url: "s3://pool/clip-01.mp4".to_string(),
            caption: "new drop".to_string(),
            tags: vec!["fyp".to_string(), "viral".to_string()],
        }
    }

    #[tokio::test]
    async fn test_successful_post_has_platform_url() {
        let service = SimulatedPostingService::new(1);

        let receipt = service
            .post_content(Platform::Tiktok, "@pool_main", &content())
            .await
            .unwrap();
        assert!(receipt.success);
        assert!(receipt.post_url.unwrap().contains("tiktok.com/@pool_main"));

        let receipt = service
            .post_content(Platform::Youtube, "pool_yt", &content())
            .await
            .unwrap();
        assert!(receipt.post_url.unwrap().contains("youtube.com/shorts/"));
    }

    #[tokio::test]
    async fn test_failure_rate() {
        let service = SimulatedPostingService::new(1).with_failure_rate(1.0);

        let receipt = service
            .post_content(Platform::Instagram, "acct", &content())
            .await
            .unwrap();
        assert!(!receipt.success);
        assert!(receipt.error.is_some());
        assert!(receipt.post_url.is_none());
    }

    #[tokio::test]
    async fn test_post_numbers_increment() {
        let service = SimulatedPostingService::new(1);

        let first = service
            .post_content(Platform::Instagram, "a", &content())
            .await
            .unwrap();
        let second = service
            .post_content(Platform::Instagram, "a", &content())
            .await
            .unwrap();
        assert_ne!(first.post_url, second.post_url);
    }
}
