use url::Url;

/// Maps asset file names to download URLs and to the local file names they
/// are stored under. Implementations decide where assets actually live.
pub trait AssetHost: Send + Sync {
    fn source_url(&self, file_name: &str) -> Result<Url, url::ParseError>;

    /// Local file name for a downloaded asset, prefixed so that assets from
    /// different hosts never collide in the downloads directory.
    fn destination_file_name(&self, file_name: &str) -> String;
}

/// Assets attached to a GitHub release.
#[derive(Debug, Clone)]
pub struct GithubReleaseHost {
    pub owner: String,
    pub repo: String,
    pub tag: String,
}

impl GithubReleaseHost {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            tag: tag.into(),
        }
    }

    fn base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "https://github.com/{}/{}/releases/download/{}/",
            self.owner, self.repo, self.tag
        ))
    }
}

impl AssetHost for GithubReleaseHost {
    fn source_url(&self, file_name: &str) -> Result<Url, url::ParseError> {
        self.base_url()?.join(file_name)
    }

    fn destination_file_name(&self, file_name: &str) -> String {
        format!(
            "github-{}-{}-{}-{}",
            self.owner, self.repo, self.tag, file_name
        )
    }
}

/// Serves assets from an arbitrary base URL. Used by tests and developer
/// overrides pointing at a local HTTP server or `file://` tree.
#[derive(Debug, Clone)]
pub struct LocalTestHost {
    pub base_url: Url,
    pub local_prefix: String,
}

impl AssetHost for LocalTestHost {
    fn source_url(&self, file_name: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(file_name)
    }

    fn destination_file_name(&self, file_name: &str) -> String {
        format!("{}-{}", self.local_prefix, file_name)
    }
}
