use std::path::PathBuf;

use super::layout::StorageLayout;
use super::model::ModelId;

/// Resolves a model identifier to a local directory of pipeline resources,
/// if the model is installed. The pipeline-loading task consumes this without
/// caring whether the path is a bundle resource, a downloaded cache
/// directory, or a developer override.
pub trait ModelLocator: Send + Sync {
    fn installed_path(&self, model: &ModelId) -> Option<PathBuf>;
}

/// Locates models installed under the storage layout.
#[derive(Debug, Clone)]
pub struct InstalledModelLocator {
    layout: StorageLayout,
}

impl InstalledModelLocator {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }
}

impl ModelLocator for InstalledModelLocator {
    fn installed_path(&self, model: &ModelId) -> Option<PathBuf> {
        let dir = self.layout.model_dir(model);
        dir.is_dir().then_some(dir)
    }
}
