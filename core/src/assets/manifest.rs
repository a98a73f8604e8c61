use serde::{Deserialize, Serialize};

use super::model::ModelId;

/// Describes a model archive that ships as multiple downloadable parts,
/// sized to stay under the asset host's per-file limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitArchiveManifest {
    /// File name of the reassembled archive, e.g. `sd2.aar`.
    pub archive_file: String,
    /// Ordered part file names, e.g. `["sd2.aar.00", "sd2.aar.01"]`.
    pub parts: Vec<String>,
    /// Expanded size, used as the rough download size estimate.
    pub uncompressed_bytes: u64,
}

impl SplitArchiveManifest {
    /// Built-in manifest for a model, if one exists. Custom models have no
    /// manifest and cannot be downloaded.
    pub fn for_model(model: &ModelId) -> Option<Self> {
        match model {
            ModelId::Sd1_4 => Some(Self {
                archive_file: "sd1.4.aar".into(),
                parts: vec!["sd1.4.aar.00".into(), "sd1.4.aar.01".into()],
                uncompressed_bytes: 5_226_992_000,
            }),
            ModelId::Sd1_5 => Some(Self {
                archive_file: "sd1.5.aar".into(),
                parts: vec!["sd1.5.aar.00".into(), "sd1.5.aar.01".into()],
                uncompressed_bytes: 5_226_992_000,
            }),
            ModelId::Sd2_0 => Some(Self {
                archive_file: "sd2.aar".into(),
                parts: vec!["sd2.aar.00".into(), "sd2.aar.01".into()],
                uncompressed_bytes: 4_913_736_000,
            }),
            ModelId::Custom(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn built_in_models_have_manifests() {
        for model in ModelId::installable() {
            let manifest = SplitArchiveManifest::for_model(&model).unwrap();
            assert!(!manifest.parts.is_empty());
            assert!(manifest.uncompressed_bytes > 0);
        }
    }

    #[test]
    fn custom_models_have_none() {
        let custom = ModelId::Custom(PathBuf::from("/models/mine"));
        assert!(SplitArchiveManifest::for_model(&custom).is_none());
    }
}
