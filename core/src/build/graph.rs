use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use super::resource::Resource;
use super::rule::Rule;

/// Ephemeral dependency graph for one scheduling invocation.
///
/// Constructed from a flattened list of leaf rules plus the target resources
/// the caller wants, then queried iteratively: `buildable_rules()` returns
/// the rules that may run right now, the caller marks them via
/// `will_start_building` / `did_finish_building`, and the loop ends when
/// `satisfied()` reports no remaining targets.
pub struct BuildGraph {
    rules: Vec<Arc<dyn Rule>>,
    want: HashSet<Resource>,
    building: HashSet<Resource>,
    have: HashSet<Resource>,
    by_output: HashMap<Resource, Vec<usize>>,
    by_input: HashMap<Resource, Vec<usize>>,
}

impl BuildGraph {
    pub fn new(rules: Vec<Arc<dyn Rule>>, targets: impl IntoIterator<Item = Resource>) -> Self {
        let mut by_output: HashMap<Resource, Vec<usize>> = HashMap::new();
        let mut by_input: HashMap<Resource, Vec<usize>> = HashMap::new();
        for (index, rule) in rules.iter().enumerate() {
            for output in rule.outputs() {
                by_output.entry(output).or_default().push(index);
            }
            for input in rule.inputs() {
                by_input.entry(input).or_default().push(index);
            }
        }
        let want: HashSet<Resource> = targets.into_iter().collect();
        debug!(
            rules = rules.len(),
            targets = want.len(),
            "constructed build graph"
        );
        Self {
            rules,
            want,
            building: HashSet::new(),
            have: HashSet::new(),
            by_output,
            by_input,
        }
    }

    /// Targets not yet in flight or satisfied.
    pub fn remaining_targets(&self) -> Vec<Resource> {
        self.want
            .iter()
            .filter(|t| !self.building.contains(t) && !self.have.contains(t))
            .cloned()
            .collect()
    }

    pub fn satisfied(&self) -> bool {
        self.remaining_targets().is_empty()
    }

    pub fn in_flight(&self) -> bool {
        !self.building.is_empty()
    }

    /// Labels of rules that consume any of `rule`'s outputs. Used to report
    /// what a failed rule blocked.
    pub fn dependents(&self, rule: &dyn Rule) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut labels = Vec::new();
        for output in rule.outputs() {
            for &index in self.by_input.get(&output).into_iter().flatten() {
                if seen.insert(index) {
                    labels.push(self.rules[index].label());
                }
            }
        }
        labels
    }

    /// A resource is satisfied when it is confirmed built, remote (fetch
    /// failures surface at execution time, not here), produced by a rule
    /// whose outputs are fresh, or produced by nothing but already on disk.
    fn is_satisfied(&self, resource: &Resource) -> bool {
        if self.have.contains(resource) {
            return true;
        }
        if !resource.is_file() {
            return true;
        }
        match self.by_output.get(resource) {
            Some(producers) => producers
                .iter()
                .any(|&index| !self.rules[index].outputs_out_of_date()),
            None => resource.exists(),
        }
    }

    /// Computes the set of rules eligible to run right now: inputs
    /// satisfied, outputs stale, and no output overlapping anything already
    /// in flight. Wanted resources that turn out to be satisfied without
    /// running anything are promoted into `have` as a side effect.
    pub fn buildable_rules(&mut self) -> Vec<Arc<dyn Rule>> {
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut visited: HashSet<Resource> = HashSet::new();
        let mut result: Vec<Arc<dyn Rule>> = Vec::new();

        for target in self.remaining_targets() {
            match self.by_output.get(&target) {
                Some(producers) => queue.extend(producers.iter().copied()),
                None => {
                    if self.is_satisfied(&target) {
                        self.have.insert(target);
                    }
                }
            }
        }

        while let Some(index) = queue.pop_front() {
            let rule = Arc::clone(&self.rules[index]);
            let outputs = rule.outputs();

            // Cycle and duplicate guard: each output is considered once per
            // invocation.
            if outputs.iter().all(|o| visited.contains(o)) {
                continue;
            }
            visited.extend(outputs.iter().cloned());

            if outputs.iter().all(|o| self.is_satisfied(o)) {
                for output in outputs {
                    self.have.insert(output);
                }
                continue;
            }

            let inputs = rule.inputs();
            let inputs_ready = inputs.iter().all(|i| self.is_satisfied(i));
            let outputs_free = outputs.iter().all(|o| !self.building.contains(o));
            if inputs_ready && outputs_free && rule.outputs_out_of_date() {
                debug!(rule = %rule.label(), "buildable");
                result.push(rule);
                continue;
            }

            for input in inputs.iter().filter(|i| !self.is_satisfied(i)) {
                if let Some(producers) = self.by_output.get(input) {
                    queue.extend(producers.iter().copied());
                }
            }
        }

        result
    }

    /// Marks a rule's outputs as in flight. Must be called before its task
    /// starts so a second `buildable_rules` call cannot hand the same
    /// outputs to anyone else.
    pub fn will_start_building(&mut self, rule: &dyn Rule) {
        for output in rule.outputs() {
            self.have.remove(&output);
            self.building.insert(output);
        }
    }

    /// Marks a rule's outputs as satisfied after its task succeeded.
    pub fn did_finish_building(&mut self, rule: &dyn Rule) {
        for output in rule.outputs() {
            self.building.remove(&output);
            self.have.insert(output);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use pretty_assertions::assert_eq;

    use super::*;

    struct StubRule {
        label: String,
        inputs: Vec<Resource>,
        outputs: Vec<Resource>,
        stale: AtomicBool,
    }

    impl StubRule {
        fn new(label: &str, inputs: &[&str], outputs: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                label: label.to_string(),
                inputs: inputs.iter().map(|p| Resource::file(*p)).collect(),
                outputs: outputs.iter().map(|p| Resource::file(*p)).collect(),
                stale: AtomicBool::new(true),
            })
        }

        fn mark_fresh(&self) {
            self.stale.store(false, Ordering::SeqCst);
        }
    }

    impl Rule for StubRule {
        fn label(&self) -> String {
            self.label.clone()
        }

        fn inputs(&self) -> Vec<Resource> {
            self.inputs.clone()
        }

        fn outputs(&self) -> Vec<Resource> {
            self.outputs.clone()
        }

        fn outputs_out_of_date(&self) -> bool {
            self.stale.load(Ordering::SeqCst)
        }
    }

    fn labels(rules: &[Arc<dyn Rule>]) -> Vec<String> {
        let mut labels: Vec<String> = rules.iter().map(|r| r.label()).collect();
        labels.sort();
        labels
    }

    #[test]
    fn chain_builds_in_dependency_order() {
        let first = StubRule::new("first", &[], &["/g/a"]);
        let second = StubRule::new("second", &["/g/a"], &["/g/b"]);
        let mut graph = BuildGraph::new(
            vec![first.clone(), second.clone()],
            [Resource::file("/g/b")],
        );

        let round = graph.buildable_rules();
        assert_eq!(labels(&round), vec!["first"]);

        graph.will_start_building(first.as_ref());
        first.mark_fresh();
        graph.did_finish_building(first.as_ref());

        let round = graph.buildable_rules();
        assert_eq!(labels(&round), vec!["second"]);

        graph.will_start_building(second.as_ref());
        second.mark_fresh();
        graph.did_finish_building(second.as_ref());
        assert!(graph.buildable_rules().is_empty());
        assert!(graph.satisfied());
    }

    #[test]
    fn independent_rules_are_buildable_concurrently() {
        let a = StubRule::new("a", &[], &["/g/a"]);
        let b = StubRule::new("b", &[], &["/g/b"]);
        let mut graph = BuildGraph::new(
            vec![a, b],
            [Resource::file("/g/a"), Resource::file("/g/b")],
        );
        assert_eq!(labels(&graph.buildable_rules()), vec!["a", "b"]);
    }

    #[test]
    fn in_flight_outputs_are_not_rescheduled() {
        let a = StubRule::new("a", &[], &["/g/a"]);
        let mut graph = BuildGraph::new(vec![a.clone()], [Resource::file("/g/a")]);

        assert_eq!(labels(&graph.buildable_rules()), vec!["a"]);
        graph.will_start_building(a.as_ref());
        assert!(graph.buildable_rules().is_empty());
        assert!(graph.in_flight());
        assert!(graph.satisfied(), "in-flight targets are not remaining");
    }

    #[test]
    fn fresh_producer_satisfies_target_without_building() {
        let a = StubRule::new("a", &[], &["/g/a"]);
        a.mark_fresh();
        let mut graph = BuildGraph::new(vec![a], [Resource::file("/g/a")]);
        assert!(graph.buildable_rules().is_empty());
        assert!(graph.satisfied());
    }

    #[test]
    fn unproducible_target_is_never_satisfied() {
        let mut graph = BuildGraph::new(vec![], [Resource::file("/g/never")]);
        assert!(graph.buildable_rules().is_empty());
        assert!(!graph.satisfied());
        assert_eq!(graph.remaining_targets(), vec![Resource::file("/g/never")]);
    }

    #[test]
    fn remote_inputs_are_always_available() {
        let url = url::Url::parse("https://example.com/p.00").unwrap();
        let fetch = Arc::new(StubRule {
            label: "fetch".into(),
            inputs: vec![Resource::remote(url)],
            outputs: vec![Resource::file("/g/p.00")],
            stale: AtomicBool::new(true),
        });
        let mut graph = BuildGraph::new(vec![fetch], [Resource::file("/g/p.00")]);
        assert_eq!(labels(&graph.buildable_rules()), vec!["fetch"]);
    }

    #[test]
    fn cyclic_rules_terminate_with_no_buildable_set() {
        let r1 = StubRule::new("r1", &["/g/b"], &["/g/a"]);
        let r2 = StubRule::new("r2", &["/g/a"], &["/g/b"]);
        let mut graph = BuildGraph::new(vec![r1, r2], [Resource::file("/g/a")]);
        assert!(graph.buildable_rules().is_empty());
        assert!(!graph.satisfied());
    }

    #[test]
    fn dependents_reports_blocked_consumers() {
        let first = StubRule::new("first", &[], &["/g/a"]);
        let second = StubRule::new("second", &["/g/a"], &["/g/b"]);
        let graph = BuildGraph::new(vec![first.clone(), second], [Resource::file("/g/b")]);
        assert_eq!(graph.dependents(first.as_ref()), vec!["second".to_string()]);
    }
}
