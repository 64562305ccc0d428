use async_trait::async_trait;

use crate::errors::VigilResult;
use crate::vision::types::VisionResponse;

/// Unified vision-model provider trait. The engine only ever sees this
/// trait, so tests swap in scripted providers and a different backend is a
/// new implementation plus a config entry.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send a prompt (plus optional PNG image) and return the processed
    /// response. Transport-level failures surface as `Err`; provider-level
    /// refusals come back as a response with a non-success status.
    async fn query(
        &self,
        prompt: &str,
        image_png: Option<&[u8]>,
        model_override: Option<&str>,
    ) -> VigilResult<VisionResponse>;
}
