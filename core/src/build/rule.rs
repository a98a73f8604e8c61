use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use super::resource::Resource;
use crate::context::AppContext;
use crate::task::TaskHandle;

/// A unit of the build plan: consumes `inputs`, produces `outputs`.
///
/// A rule is either *executable* (overrides [`Rule::spawn_task`]) or
/// *composite* (overrides [`Rule::sub_rules`]); the scheduler rejects rules
/// that are neither or both.
pub trait Rule: Send + Sync {
    /// Human-readable name for logs and task labels.
    fn label(&self) -> String;

    fn inputs(&self) -> Vec<Resource>;

    fn outputs(&self) -> Vec<Resource>;

    /// Constituent rules of a composite rule.
    fn sub_rules(&self) -> Option<Vec<Arc<dyn Rule>>> {
        None
    }

    /// Creates (without starting) the task that produces this rule's
    /// outputs.
    fn spawn_task(&self, _ctx: &AppContext) -> Option<Arc<dyn TaskHandle>> {
        None
    }

    /// Whether the outputs need rebuilding.
    ///
    /// True when any output is absent, or when the oldest output is older
    /// than the newest locally-present input. Inputs that are remote or
    /// missing contribute no timestamp: an absent input means some upstream
    /// rule is about to produce it, and the graph already orders this rule
    /// after that one.
    fn outputs_out_of_date(&self) -> bool {
        let outputs = self.outputs();
        if outputs.is_empty() {
            return false;
        }

        let mut oldest_output: Option<SystemTime> = None;
        for output in &outputs {
            match output.mtime() {
                Some(mtime) => {
                    oldest_output = Some(match oldest_output {
                        Some(current) => current.min(mtime),
                        None => mtime,
                    });
                }
                None => {
                    debug!(rule = %self.label(), output = %output, "output missing; stale");
                    return true;
                }
            }
        }

        let newest_input = self
            .inputs()
            .iter()
            .filter_map(Resource::mtime)
            .max();

        match (oldest_output, newest_input) {
            (Some(output), Some(input)) => {
                let stale = output < input;
                if stale {
                    debug!(rule = %self.label(), "input newer than output; stale");
                }
                stale
            }
            _ => false,
        }
    }

    /// Deletes whatever outputs exist on disk, so a failed or cancelled
    /// build does not leave half-written artifacts behind for the staleness
    /// check to mistake for finished ones.
    fn remove_outputs(&self) -> io::Result<()> {
        for output in self.outputs() {
            let Some(path) = output.path() else { continue };
            if path.is_dir() {
                std::fs::remove_dir_all(path)?;
            } else if path.exists() {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
