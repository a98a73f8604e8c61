use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

use super::resource::Resource;
use super::rule::Rule;
use crate::assets::{AssetHost, ModelId, ProgressSink, SplitArchiveManifest, StorageLayout};
use crate::context::AppContext;
use crate::error::{BuildError, TaskError, TaskResult};
use crate::task::{ObservableTask, ProgressUnits, TaskHandle, TaskKind};

const CONCAT_BUFFER_BYTES: usize = 1 << 20;

/// Fetches one remote file into the downloads directory.
#[derive(Debug)]
pub struct DownloadRule {
    source: Url,
    destination: PathBuf,
    expected_bytes: u64,
}

impl DownloadRule {
    pub fn new(source: Url, destination: PathBuf, expected_bytes: u64) -> Self {
        Self {
            source,
            destination,
            expected_bytes,
        }
    }
}

impl Rule for DownloadRule {
    fn label(&self) -> String {
        format!("download {}", self.source)
    }

    fn inputs(&self) -> Vec<Resource> {
        vec![Resource::remote(self.source.clone())]
    }

    fn outputs(&self) -> Vec<Resource> {
        vec![Resource::file(&self.destination)]
    }

    fn spawn_task(&self, ctx: &AppContext) -> Option<Arc<dyn TaskHandle>> {
        let downloader = ctx.downloader();
        let source = self.source.clone();
        let destination = self.destination.clone();
        let expected_bytes = self.expected_bytes;
        let task = ObservableTask::<PathBuf, ProgressUnits>::new(
            self.label(),
            TaskKind::Download,
            move |task| async move {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| TaskError::other(e.into()))?;
                }
                let sink = progress_sink(&task);
                let cancel = task.cancel_flag();
                downloader
                    .download(source, &destination, expected_bytes, sink, cancel)
                    .await
                    .map_err(TaskError::other)
            },
        );
        Some(task)
    }
}

/// Reassembles split archive parts into one file, in part order.
#[derive(Debug)]
pub struct ConcatRule {
    parts: Vec<PathBuf>,
    destination: PathBuf,
}

impl ConcatRule {
    pub fn new(parts: Vec<PathBuf>, destination: PathBuf) -> Self {
        Self { parts, destination }
    }

    async fn concat(
        parts: Vec<PathBuf>,
        destination: PathBuf,
        task: Arc<ObservableTask<PathBuf, ProgressUnits>>,
    ) -> TaskResult<PathBuf> {
        let io_err = |e: std::io::Error| TaskError::other(e.into());

        let mut total = 0u64;
        for part in &parts {
            total += tokio::fs::metadata(part).await.map_err(io_err)?.len();
        }
        task.progress().set_total(total);

        let cancel = task.cancel_flag();
        let mut out = tokio::fs::File::create(&destination).await.map_err(io_err)?;
        let mut written = 0u64;
        let mut buf = vec![0u8; CONCAT_BUFFER_BYTES];
        for part in &parts {
            let mut file = tokio::fs::File::open(part).await.map_err(io_err)?;
            loop {
                cancel.check()?;
                let n = file.read(&mut buf).await.map_err(io_err)?;
                if n == 0 {
                    break;
                }
                out.write_all(&buf[..n]).await.map_err(io_err)?;
                written += n as u64;
                task.progress().set_completed(written);
                task.report_progress(ProgressUnits {
                    completed: written,
                    total,
                });
            }
        }
        out.flush().await.map_err(io_err)?;
        Ok(destination)
    }
}

impl Rule for ConcatRule {
    fn label(&self) -> String {
        format!("concatenate {}", self.destination.display())
    }

    fn inputs(&self) -> Vec<Resource> {
        self.parts.iter().cloned().map(Resource::File).collect()
    }

    fn outputs(&self) -> Vec<Resource> {
        vec![Resource::file(&self.destination)]
    }

    fn spawn_task(&self, _ctx: &AppContext) -> Option<Arc<dyn TaskHandle>> {
        let parts = self.parts.clone();
        let destination = self.destination.clone();
        let task = ObservableTask::new(self.label(), TaskKind::Concat, move |task| {
            Self::concat(parts, destination, task)
        });
        Some(task)
    }
}

/// Unpacks the reassembled archive into the model directory.
#[derive(Debug)]
pub struct ExtractRule {
    archive: PathBuf,
    destination: PathBuf,
}

impl ExtractRule {
    pub fn new(archive: PathBuf, destination: PathBuf) -> Self {
        Self {
            archive,
            destination,
        }
    }
}

impl Rule for ExtractRule {
    fn label(&self) -> String {
        format!("extract {}", self.archive.display())
    }

    fn inputs(&self) -> Vec<Resource> {
        vec![Resource::file(&self.archive)]
    }

    fn outputs(&self) -> Vec<Resource> {
        vec![Resource::file(&self.destination)]
    }

    fn spawn_task(&self, ctx: &AppContext) -> Option<Arc<dyn TaskHandle>> {
        let extractor = ctx.extractor();
        let archive = self.archive.clone();
        let destination = self.destination.clone();
        let task = ObservableTask::<(), ProgressUnits>::new(
            self.label(),
            TaskKind::Extract,
            move |task| async move {
                tokio::fs::create_dir_all(&destination)
                    .await
                    .map_err(|e| TaskError::other(e.into()))?;
                let sink = progress_sink(&task);
                let cancel = task.cancel_flag();
                extractor
                    .extract(&archive, &destination, sink, cancel)
                    .await
                    .map_err(TaskError::other)
            },
        );
        Some(task)
    }
}

/// Download, reassemble, and extract one model: the composite rule behind
/// "install".
#[derive(Debug)]
pub struct InstallModelRule {
    model: ModelId,
    downloads: Vec<Arc<DownloadRule>>,
    concat: Arc<ConcatRule>,
    extract: Arc<ExtractRule>,
    model_dir: PathBuf,
}

impl InstallModelRule {
    pub fn new(
        model: ModelId,
        host: &dyn AssetHost,
        layout: &StorageLayout,
    ) -> Result<Self, BuildError> {
        let manifest = SplitArchiveManifest::for_model(&model)
            .ok_or_else(|| BuildError::NoManifest(model.to_string()))?;
        // Rough per-part estimate until the transfer reports a real total.
        let per_part_estimate = manifest.uncompressed_bytes / manifest.parts.len().max(1) as u64;

        let mut downloads = Vec::with_capacity(manifest.parts.len());
        let mut part_paths = Vec::with_capacity(manifest.parts.len());
        for part in &manifest.parts {
            let source = host.source_url(part)?;
            let destination = layout.download_path(&host.destination_file_name(part));
            part_paths.push(destination.clone());
            downloads.push(Arc::new(DownloadRule::new(
                source,
                destination,
                per_part_estimate,
            )));
        }

        let archive_path =
            layout.download_path(&host.destination_file_name(&manifest.archive_file));
        let model_dir = layout.model_dir(&model);
        let concat = Arc::new(ConcatRule::new(part_paths, archive_path.clone()));
        let extract = Arc::new(ExtractRule::new(archive_path, model_dir.clone()));

        Ok(Self {
            model,
            downloads,
            concat,
            extract,
            model_dir,
        })
    }

    pub fn model(&self) -> &ModelId {
        &self.model
    }

    /// Deletes the downloaded parts and the reassembled archive, keeping the
    /// installed model directory. Called after a successful install to
    /// reclaim the transient disk space.
    pub fn remove_intermediate_outputs(&self) -> std::io::Result<()> {
        for rule in &self.downloads {
            rule.remove_outputs()?;
        }
        self.concat.remove_outputs()
    }
}

impl Rule for InstallModelRule {
    fn label(&self) -> String {
        format!("install {}", self.model)
    }

    fn inputs(&self) -> Vec<Resource> {
        self.downloads.iter().flat_map(|d| d.inputs()).collect()
    }

    fn outputs(&self) -> Vec<Resource> {
        vec![Resource::file(&self.model_dir)]
    }

    fn sub_rules(&self) -> Option<Vec<Arc<dyn Rule>>> {
        let mut subs: Vec<Arc<dyn Rule>> = Vec::with_capacity(self.downloads.len() + 2);
        for download in &self.downloads {
            subs.push(Arc::clone(download) as Arc<dyn Rule>);
        }
        subs.push(Arc::clone(&self.concat) as Arc<dyn Rule>);
        subs.push(Arc::clone(&self.extract) as Arc<dyn Rule>);
        Some(subs)
    }
}

/// Installs every built-in model that is not already present.
pub struct InstallAllModelsRule {
    installs: Vec<Arc<InstallModelRule>>,
}

impl InstallAllModelsRule {
    pub fn new(host: &dyn AssetHost, layout: &StorageLayout) -> Result<Self, BuildError> {
        let installs = ModelId::installable()
            .into_iter()
            .map(|model| InstallModelRule::new(model, host, layout).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { installs })
    }

    pub fn remove_intermediate_outputs(&self) -> std::io::Result<()> {
        for install in &self.installs {
            install.remove_intermediate_outputs()?;
        }
        Ok(())
    }
}

impl Rule for InstallAllModelsRule {
    fn label(&self) -> String {
        "install all models".into()
    }

    fn inputs(&self) -> Vec<Resource> {
        self.installs.iter().flat_map(|i| i.inputs()).collect()
    }

    fn outputs(&self) -> Vec<Resource> {
        self.installs.iter().flat_map(|i| i.outputs()).collect()
    }

    fn sub_rules(&self) -> Option<Vec<Arc<dyn Rule>>> {
        Some(
            self.installs
                .iter()
                .map(|i| Arc::clone(i) as Arc<dyn Rule>)
                .collect(),
        )
    }
}

/// Byte-progress callback that mirrors transfer progress into the task's
/// counters and typed progress state.
fn progress_sink<S>(task: &Arc<ObservableTask<S, ProgressUnits>>) -> ProgressSink
where
    S: Clone + Send + Sync + 'static,
{
    let task = Arc::clone(task);
    Arc::new(move |completed, total| {
        task.progress().set_total(total);
        task.progress().set_completed(completed);
        task.report_progress(ProgressUnits { completed, total });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::GithubReleaseHost;

    #[test]
    fn install_rule_wires_urls_and_paths() {
        let host = GithubReleaseHost::new("atelier-app", "atelier", "v0.4.0");
        let layout = StorageLayout::new("/data/atelier");
        let rule = InstallModelRule::new(ModelId::Sd2_0, &host, &layout).unwrap();

        let inputs = rule.inputs();
        assert_eq!(inputs.len(), 2);
        assert_eq!(
            inputs[0],
            Resource::remote(
                Url::parse(
                    "https://github.com/atelier-app/atelier/releases/download/v0.4.0/sd2.aar.00"
                )
                .unwrap()
            )
        );
        assert_eq!(
            rule.outputs(),
            vec![Resource::file("/data/atelier/models/sd2.0")]
        );
        assert_eq!(rule.sub_rules().unwrap().len(), 4);
    }

    #[test]
    fn custom_models_cannot_be_installed() {
        let host = GithubReleaseHost::new("atelier-app", "atelier", "v0.4.0");
        let layout = StorageLayout::new("/data/atelier");
        let err = InstallModelRule::new(
            ModelId::Custom("/home/me/model".into()),
            &host,
            &layout,
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::NoManifest(_)));
    }

    #[test]
    fn install_all_covers_every_installable_model() {
        let host = GithubReleaseHost::new("atelier-app", "atelier", "v0.4.0");
        let layout = StorageLayout::new("/data/atelier");
        let rule = InstallAllModelsRule::new(&host, &layout).unwrap();
        assert_eq!(
            rule.sub_rules().unwrap().len(),
            ModelId::installable().len()
        );
    }

    #[tokio::test]
    async fn concat_joins_parts_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let part_a = tmp.path().join("p.00");
        let part_b = tmp.path().join("p.01");
        let joined = tmp.path().join("joined.aar");
        std::fs::write(&part_a, b"hello ").unwrap();
        std::fs::write(&part_b, b"world").unwrap();

        let ctx = AppContext::for_tests(tmp.path());
        let rule = ConcatRule::new(vec![part_a, part_b], joined.clone());
        let task = rule.spawn_task(&ctx).unwrap();
        task.resume();
        task.wait_ok().await.unwrap();

        assert_eq!(std::fs::read(&joined).unwrap(), b"hello world");
        assert_eq!(task.progress_units().fraction(), 1.0);
    }

    #[tokio::test]
    async fn concat_fails_when_a_part_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::for_tests(tmp.path());
        let rule = ConcatRule::new(
            vec![tmp.path().join("absent.00")],
            tmp.path().join("joined"),
        );
        let task = rule.spawn_task(&ctx).unwrap();
        task.resume();
        assert!(task.wait_ok().await.is_err());
    }
}
