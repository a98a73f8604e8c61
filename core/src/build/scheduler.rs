use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, warn};

use super::graph::BuildGraph;
use super::resource::Resource;
use super::rule::Rule;
use crate::context::AppContext;
use crate::error::{BuildError, TaskResult};
use crate::task::{ObservableTask, TaskHandle, TaskKind};

type CompletedBranch = (Arc<dyn Rule>, TaskResult<()>);
type BranchFuture = Pin<Box<dyn Future<Output = CompletedBranch> + Send>>;

/// Turns build rules into running tasks.
///
/// Executable rules map to a single task. Composite rules map to one task
/// that drives a fresh [`BuildGraph`] over the flattened leaf rules,
/// scheduling buildable rules concurrently until the rule's own outputs are
/// satisfied.
#[derive(Clone)]
pub struct RuleScheduler {
    ctx: AppContext,
}

impl RuleScheduler {
    pub fn new(ctx: AppContext) -> Self {
        Self { ctx }
    }

    /// Create and resume the task that builds `rule`'s outputs.
    pub fn schedule(&self, rule: Arc<dyn Rule>) -> Result<Arc<dyn TaskHandle>, BuildError> {
        if rule.sub_rules().is_some() {
            let scheduler = self.clone();
            let driven = Arc::clone(&rule);
            let task = ObservableTask::<(), ()>::new(rule.label(), TaskKind::Composite, move |task| {
                scheduler.drive(driven, task)
            });
            task.resume();
            return Ok(task);
        }

        if let Some(task) = rule.spawn_task(&self.ctx) {
            task.resume();
            return Ok(task);
        }

        Err(BuildError::UnschedulableRule(rule.label()))
    }

    /// Iterate the graph until every target of `rule` is satisfied, running
    /// buildable rules concurrently and reporting completions back in.
    ///
    /// Failure policy: the first hard failure cancels all sibling branches
    /// and fails the composite; a merely cancelled branch propagates as
    /// cancellation without forcing siblings down.
    async fn drive(self, rule: Arc<dyn Rule>, task: Arc<ObservableTask<(), ()>>) -> TaskResult<()> {
        let leaves = flatten(&rule);
        debug!(rule = %rule.label(), leaves = leaves.len(), "driving composite rule");
        let mut graph = BuildGraph::new(leaves, rule.outputs());
        let cancel = task.cancel_flag();
        let mut in_flight: FuturesUnordered<BranchFuture> = FuturesUnordered::new();
        let mut running: Vec<Arc<dyn TaskHandle>> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                for handle in &running {
                    handle.cancel("parent build cancelled");
                }
                cancel.check()?;
            }

            for sub in graph.buildable_rules() {
                graph.will_start_building(sub.as_ref());
                let handle = self.schedule(Arc::clone(&sub))?;
                running.push(Arc::clone(&handle));
                let waiter = Arc::clone(&task);
                in_flight.push(Box::pin(async move {
                    let result = waiter.wait_for_handle(&handle).await;
                    (sub, result)
                }));
            }

            if graph.satisfied() && in_flight.is_empty() {
                return Ok(());
            }

            let completed = tokio::select! {
                branch = in_flight.next() => branch,
                _ = cancel.cancelled() => {
                    for handle in &running {
                        handle.cancel("parent build cancelled");
                    }
                    cancel.check()?;
                    None
                }
            };
            let Some((sub, result)) = completed else {
                return Err(BuildError::UnsatisfiableTargets(format_resources(
                    &graph.remaining_targets(),
                ))
                .into());
            };

            match result {
                Ok(()) => graph.did_finish_building(sub.as_ref()),
                Err(err) => {
                    warn!(
                        rule = %sub.label(),
                        error = %err,
                        blocked = ?graph.dependents(sub.as_ref()),
                        "build rule failed"
                    );
                    if let Err(io_err) = sub.remove_outputs() {
                        warn!(rule = %sub.label(), error = %io_err, "could not remove partial outputs");
                    }
                    if !err.is_cancelled() {
                        for handle in &running {
                            handle.cancel("dependency failed");
                        }
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Expand a rule tree into its leaf (executable) rules.
fn flatten(rule: &Arc<dyn Rule>) -> Vec<Arc<dyn Rule>> {
    match rule.sub_rules() {
        Some(subs) => subs.iter().flat_map(flatten).collect(),
        None => vec![Arc::clone(rule)],
    }
}

fn format_resources(resources: &[Resource]) -> String {
    resources
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
