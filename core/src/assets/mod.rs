//! Asset addressing: model identifiers, split-archive manifests, asset
//! hosts, the on-disk storage layout, and the collaborator interfaces for
//! download transport and archive extraction.

mod host;
mod layout;
mod locator;
mod manifest;
mod model;
mod transport;

pub use host::{AssetHost, GithubReleaseHost, LocalTestHost};
pub use layout::StorageLayout;
pub use locator::{InstalledModelLocator, ModelLocator};
pub use manifest::SplitArchiveManifest;
pub use model::ModelId;
pub use transport::{Downloader, Extractor, ProgressSink};
