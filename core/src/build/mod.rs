//! Dependency-driven build engine: resources, rules, the per-invocation
//! build graph, and the scheduler that turns rules into running tasks.

mod graph;
mod resource;
mod rule;
mod rules;
mod scheduler;

pub use graph::BuildGraph;
pub use resource::Resource;
pub use rule::Rule;
pub use rules::{
    ConcatRule, DownloadRule, ExtractRule, InstallAllModelsRule, InstallModelRule,
};
pub use scheduler::RuleScheduler;
