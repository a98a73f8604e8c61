use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::task::CancelFlag;

/// Byte-level progress callback: `(completed, total)`.
pub type ProgressSink = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Network download primitive, provided by the application shell.
///
/// The core wraps a download in an observable task; the transport itself
/// (HTTP client, resumption, retry) is not this crate's concern.
/// Implementations must poll `cancel` between chunks.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn download(
        &self,
        source: Url,
        destination: &Path,
        expected_bytes: u64,
        progress: ProgressSink,
        cancel: CancelFlag,
    ) -> anyhow::Result<PathBuf>;
}

/// Archive extraction primitive, provided by the application shell.
///
/// Given a local archive and a destination directory, populates the
/// destination. Progress is coarse (entries extracted); implementations must
/// poll `cancel` between entries.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        archive: &Path,
        destination: &Path,
        progress: ProgressSink,
        cancel: CancelFlag,
    ) -> anyhow::Result<()>;
}
