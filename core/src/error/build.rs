use thiserror::Error;

/// Errors raised while planning or scheduling build rules.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// The rule is neither composite nor executable.
    #[error("rule '{0}' is neither composite nor executable")]
    UnschedulableRule(String),

    /// The graph can make no further progress but targets remain.
    #[error("no rule can produce the remaining targets: {0}")]
    UnsatisfiableTargets(String),

    #[error("no archive manifest is defined for model '{0}'")]
    NoManifest(String),

    #[error("invalid asset url")]
    InvalidAssetUrl(#[from] url::ParseError),
}
