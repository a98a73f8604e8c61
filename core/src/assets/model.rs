use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifier of an installable diffusion model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelId {
    Sd1_4,
    Sd1_5,
    Sd2_0,
    /// A model directory supplied by the user, outside our storage layout.
    Custom(PathBuf),
}

impl ModelId {
    /// The built-in models that can be downloaded and installed.
    pub fn installable() -> Vec<ModelId> {
        vec![ModelId::Sd1_4, ModelId::Sd1_5, ModelId::Sd2_0]
    }

    /// Directory name of the installed model under the models directory.
    pub fn dir_name(&self) -> String {
        match self {
            ModelId::Sd1_4 => "sd1.4".into(),
            ModelId::Sd1_5 => "sd1.5".into(),
            ModelId::Sd2_0 => "sd2.0".into(),
            ModelId::Custom(path) => {
                let safe: String = path
                    .to_string_lossy()
                    .chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect();
                format!("custom-{safe}")
            }
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelId::Custom(path) => write!(f, "custom model at {}", path.display()),
            other => f.write_str(&other.dir_name()),
        }
    }
}
