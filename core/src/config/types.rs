use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub asset_host: AssetHostConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub generate: GenerateConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for installed models and downloads. Defaults to the
    /// per-user data directory when unset.
    #[serde(default)]
    pub root: Option<String>,
}

/// GitHub release the model archives are attached to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetHostConfig {
    #[serde(default = "default_host_owner")]
    pub owner: String,

    #[serde(default = "default_host_repo")]
    pub repo: String,

    #[serde(default = "default_host_tag")]
    pub tag: String,
}

fn default_host_owner() -> String {
    "atelier-app".to_string()
}

fn default_host_repo() -> String {
    "atelier-models".to_string()
}

fn default_host_tag() -> String {
    "v1.0.0".to_string()
}

impl Default for AssetHostConfig {
    fn default() -> Self {
        Self {
            owner: default_host_owner(),
            repo: default_host_repo(),
            tag: default_host_tag(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// EnvFilter string, e.g. "info" or "atelier_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            level: default_logging_level(),
        }
    }
}

/// Defaults applied to generation requests that leave a knob unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    #[serde(default = "default_steps")]
    pub steps: u32,

    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,

    #[serde(default = "default_image_count")]
    pub image_count: u32,
}

fn default_steps() -> u32 {
    20
}

fn default_guidance_scale() -> f32 {
    7.5
}

fn default_image_count() -> u32 {
    1
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            steps: default_steps(),
            guidance_scale: default_guidance_scale(),
            image_count: default_image_count(),
        }
    }
}
