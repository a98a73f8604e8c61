use std::io;
use std::path::{Path, PathBuf};

use super::model::ModelId;

/// On-disk layout of installed models and in-progress downloads:
///
/// ```text
/// <root>/
///     models/
///         sd2.0/
///     downloads/
///         github-...-sd2.aar.00
///         github-...-sd2.aar
/// ```
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.root.join("downloads")
    }

    /// Directory a model is installed into.
    pub fn model_dir(&self, model: &ModelId) -> PathBuf {
        match model {
            ModelId::Custom(path) => path.clone(),
            other => self.models_dir().join(other.dir_name()),
        }
    }

    pub fn download_path(&self, file_name: &str) -> PathBuf {
        self.downloads_dir().join(file_name)
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.models_dir())?;
        std::fs::create_dir_all(self.downloads_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_root() {
        let layout = StorageLayout::new("/data/atelier");
        assert_eq!(layout.models_dir(), PathBuf::from("/data/atelier/models"));
        assert_eq!(
            layout.model_dir(&ModelId::Sd2_0),
            PathBuf::from("/data/atelier/models/sd2.0")
        );
        assert_eq!(
            layout.download_path("part.00"),
            PathBuf::from("/data/atelier/downloads/part.00")
        );
    }

    #[test]
    fn custom_models_keep_their_own_path() {
        let layout = StorageLayout::new("/data/atelier");
        let custom = ModelId::Custom(PathBuf::from("/home/me/model"));
        assert_eq!(layout.model_dir(&custom), PathBuf::from("/home/me/model"));
    }

    #[test]
    fn ensure_dirs_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path());
        layout.ensure_dirs().unwrap();
        assert!(layout.models_dir().is_dir());
        assert!(layout.downloads_dir().is_dir());
    }
}
