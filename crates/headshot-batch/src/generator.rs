use async_trait::async_trait;
use headshot_common::{ResultLocator, Result, SourceImage};

/// A single-shot remote image generation call.
///
/// Implementations must not retry internally; the caller decides whether a
/// failed job is run again.
#[async_trait]
pub trait RemoteGenerator: Send + Sync {
    async fn generate(&self, image: &SourceImage, prompt: &str) -> Result<ResultLocator>;
}
