//! The kernel: the facade the application shell drives. Owns the task
//! registry, the single-flight pipeline cache, the serial inference lane,
//! and the rule scheduler, and hands out jobs for installing models,
//! loading pipelines, and generating images.

mod pipeline;

use std::sync::Arc;

use tracing::warn;

use crate::assets::ModelId;
use crate::build::{InstallAllModelsRule, InstallModelRule, Rule, RuleScheduler};
use crate::context::AppContext;
use crate::error::{BuildError, TaskError};
use crate::task::{
    ObservableTask, SerialQueue, SingleFlight, TaskHandle, TaskKind, TaskRegistry,
};

pub use pipeline::{
    GenerateProgress, GenerateRequest, ImageData, Pipeline, PipelineLoader, Seed, StepCallback,
};

/// Central coordinator for model installs, pipeline loads, and generation.
///
/// Must be created inside a tokio runtime; the inference queue's dispatcher
/// is spawned on construction.
pub struct Kernel {
    ctx: AppContext,
    scheduler: RuleScheduler,
    registry: TaskRegistry,
    pipelines: SingleFlight<ModelId, Arc<dyn Pipeline>, ()>,
    inference: SerialQueue,
}

impl Kernel {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            scheduler: RuleScheduler::new(ctx.clone()),
            registry: TaskRegistry::new(),
            pipelines: SingleFlight::new(),
            inference: SerialQueue::new("inference"),
            ctx,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Live tasks, for rendering.
    pub fn tasks(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Built-in models with an installed directory on disk.
    pub fn installed_models(&self) -> Vec<ModelId> {
        let locator = self.ctx.locator();
        ModelId::installable()
            .into_iter()
            .filter(|model| locator.installed_path(model).is_some())
            .collect()
    }

    /// Download, reassemble, and extract one model. The returned task is
    /// already running; intermediate download artifacts are cleaned up after
    /// a successful install.
    pub fn install_model_job(&self, model: ModelId) -> Result<Arc<dyn TaskHandle>, BuildError> {
        let host = self.ctx.host();
        let rule = Arc::new(InstallModelRule::new(model, host.as_ref(), self.ctx.layout())?);
        let handle = self.scheduler.schedule(Arc::clone(&rule) as Arc<dyn Rule>)?;
        self.registry.track(Arc::clone(&handle));

        let finished = Arc::clone(&handle);
        tokio::spawn(async move {
            if finished.wait_ok().await.is_ok() {
                if let Err(err) = rule.remove_intermediate_outputs() {
                    warn!(install = %rule.label(), error = %err, "could not remove install intermediates");
                }
            }
        });
        Ok(handle)
    }

    /// Force a clean reinstall: delete the installed model directory, forget
    /// any cached pipeline for it, and install from scratch.
    pub fn reinstall_model_job(&self, model: ModelId) -> Result<Arc<dyn TaskHandle>, BuildError> {
        let host = self.ctx.host();
        let rule = InstallModelRule::new(model.clone(), host.as_ref(), self.ctx.layout())?;
        if let Err(err) = rule.remove_outputs() {
            // The rebuild will hit the same filesystem problem and report it.
            warn!(model = %model, error = %err, "could not remove outputs before reinstall");
        }
        self.pipelines.drop_key(&model);
        self.install_model_job(model)
    }

    /// Install every built-in model that is stale or missing.
    pub fn install_all_models_job(&self) -> Result<Arc<dyn TaskHandle>, BuildError> {
        let host = self.ctx.host();
        let rule = Arc::new(InstallAllModelsRule::new(host.as_ref(), self.ctx.layout())?);
        let handle = self.scheduler.schedule(Arc::clone(&rule) as Arc<dyn Rule>)?;
        self.registry.track(Arc::clone(&handle));

        let finished = Arc::clone(&handle);
        tokio::spawn(async move {
            if finished.wait_ok().await.is_ok() {
                if let Err(err) = rule.remove_intermediate_outputs() {
                    warn!(error = %err, "could not remove install intermediates");
                }
            }
        });
        Ok(handle)
    }

    /// The single-flight pipeline load for `model`. Repeated calls while a
    /// load is in flight or completed return the same task; a failed load is
    /// retried from scratch on the next call.
    pub fn load_pipeline_job(&self, model: &ModelId) -> Arc<ObservableTask<Arc<dyn Pipeline>, ()>> {
        let task = self.pipelines.get_or_create(model.clone(), || {
            let ctx = self.ctx.clone();
            let model = model.clone();
            ObservableTask::new(
                format!("load pipeline for {model}"),
                TaskKind::LoadPipeline,
                move |task| async move {
                    let Some(directory) = ctx.locator().installed_path(&model) else {
                        return Err(TaskError::ResourceNotFound(format!(
                            "model '{model}' is not installed"
                        )));
                    };
                    ctx.pipeline_loader()
                        .load(&model, &directory, task.cancel_flag())
                        .await
                        .map_err(TaskError::other)
                },
            )
        });
        task.resume();
        task
    }

    /// Warm the pipeline cache for `model` without generating anything.
    pub fn preload_pipeline_job(&self, model: &ModelId) -> Arc<dyn TaskHandle> {
        let load = self.load_pipeline_job(model);
        let task = ObservableTask::<(), ()>::new(
            format!("preload {model}"),
            TaskKind::PreloadPipeline,
            move |task| async move {
                task.wait_for(&load).await?;
                Ok(())
            },
        );
        let handle = self.registry.track(task);
        handle.resume();
        handle
    }

    /// Queue an image generation. The job waits for the pipeline load, then
    /// runs on the serial inference lane; at most one generation occupies
    /// the backend at a time.
    pub fn generate_image_job(
        &self,
        request: GenerateRequest,
    ) -> Arc<ObservableTask<Vec<ImageData>, GenerateProgress>> {
        let load = self.load_pipeline_job(&request.model);
        let label = format!("generate \"{}\"", request.prompt);
        let task = ObservableTask::new(label, TaskKind::Generate, move |task| async move {
            task.cancel_flag().check()?;
            let pipeline = task.wait_for(&load).await?;
            task.cancel_flag().check()?;

            task.progress().set_total(request.steps as u64);
            let cancel = task.cancel_flag();
            let observer = Arc::clone(&task);
            let on_step: StepCallback = Arc::new(move |step, total_steps| {
                observer.progress().set_completed(step as u64);
                observer.report_progress(GenerateProgress { step, total_steps });
                !cancel.is_cancelled()
            });

            let images = pipeline
                .generate(&request, on_step)
                .await
                .map_err(TaskError::other)?;
            // The backend may have stopped at a step boundary rather than
            // erroring; surface that as a cancellation, not a success.
            task.cancel_flag().check()?;
            Ok(images)
        });
        self.registry.track(Arc::clone(&task) as Arc<dyn TaskHandle>);
        self.inference.enqueue(Arc::clone(&task) as Arc<dyn TaskHandle>);
        task
    }
}
