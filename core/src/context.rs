use std::sync::Arc;

use crate::assets::{
    AssetHost, Downloader, Extractor, GithubReleaseHost, InstalledModelLocator, ModelLocator,
    StorageLayout,
};
use crate::config::AppConfig;
use crate::kernel::PipelineLoader;

/// Shared application context: configuration, the storage layout derived
/// from it, and the collaborator implementations the shell plugs in.
///
/// Cheap to clone; every task and scheduler holds its own copy instead of
/// reaching for globals.
#[derive(Clone)]
pub struct AppContext {
    config: Arc<AppConfig>,
    layout: StorageLayout,
    host: Arc<dyn AssetHost>,
    downloader: Arc<dyn Downloader>,
    extractor: Arc<dyn Extractor>,
    locator: Arc<dyn ModelLocator>,
    pipeline_loader: Arc<dyn PipelineLoader>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        downloader: Arc<dyn Downloader>,
        extractor: Arc<dyn Extractor>,
        pipeline_loader: Arc<dyn PipelineLoader>,
    ) -> Self {
        let root = config.storage.root.clone().unwrap_or_else(|| ".".into());
        let layout = StorageLayout::new(root);
        let host = Arc::new(GithubReleaseHost::new(
            config.asset_host.owner.clone(),
            config.asset_host.repo.clone(),
            config.asset_host.tag.clone(),
        ));
        let locator = Arc::new(InstalledModelLocator::new(layout.clone()));
        Self {
            config: Arc::new(config),
            layout,
            host,
            downloader,
            extractor,
            locator,
            pipeline_loader,
        }
    }

    /// Replace the asset host, e.g. to point tests at a local server.
    pub fn with_host(mut self, host: Arc<dyn AssetHost>) -> Self {
        self.host = host;
        self
    }

    /// Replace the model locator, e.g. to resolve bundled models.
    pub fn with_locator(mut self, locator: Arc<dyn ModelLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn host(&self) -> Arc<dyn AssetHost> {
        self.host.clone()
    }

    pub fn downloader(&self) -> Arc<dyn Downloader> {
        self.downloader.clone()
    }

    pub fn extractor(&self) -> Arc<dyn Extractor> {
        self.extractor.clone()
    }

    pub fn locator(&self) -> Arc<dyn ModelLocator> {
        self.locator.clone()
    }

    pub fn pipeline_loader(&self) -> Arc<dyn PipelineLoader> {
        self.pipeline_loader.clone()
    }
}
