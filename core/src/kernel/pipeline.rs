use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assets::ModelId;
use crate::config::GenerateConfig;
use crate::task::CancelFlag;

/// Seed for the diffusion sampler. `Random` is resolved by the pipeline
/// implementation so the backend's own RNG decides reproducibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seed {
    Random,
    Fixed(u32),
}

impl Default for Seed {
    fn default() -> Self {
        Seed::Random
    }
}

/// One image generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: ModelId,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub seed: Seed,
    pub steps: u32,
    pub guidance_scale: f32,
    pub image_count: u32,
    pub safety_checks: bool,
}

impl GenerateRequest {
    /// Request with all knobs taken from configuration defaults.
    pub fn new(model: ModelId, prompt: impl Into<String>, defaults: &GenerateConfig) -> Self {
        Self {
            model,
            prompt: prompt.into(),
            negative_prompt: String::new(),
            seed: Seed::Random,
            steps: defaults.steps,
            guidance_scale: defaults.guidance_scale,
            image_count: defaults.image_count,
            safety_checks: true,
        }
    }
}

/// Step-level progress of a generation in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateProgress {
    pub step: u32,
    pub total_steps: u32,
}

/// A finished image. Pixel data is shared, so clones are cheap and many
/// observers can hold the same result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Arc<Vec<u8>>,
}

/// Per-step callback during generation; returning `false` asks the pipeline
/// to stop at the next step boundary.
pub type StepCallback = Arc<dyn Fn(u32, u32) -> bool + Send + Sync>;

/// A loaded diffusion pipeline, ready to generate.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn generate(
        &self,
        request: &GenerateRequest,
        on_step: StepCallback,
    ) -> anyhow::Result<Vec<ImageData>>;
}

/// Loads pipeline weights from an installed model directory. Provided by the
/// application shell; loading is expensive, which is why loaded pipelines go
/// through the single-flight cache.
#[async_trait]
pub trait PipelineLoader: Send + Sync {
    async fn load(
        &self,
        model: &ModelId,
        directory: &Path,
        cancel: CancelFlag,
    ) -> anyhow::Result<Arc<dyn Pipeline>>;
}
