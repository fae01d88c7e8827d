//! Kahn's algorithm over a workflow's `depends_on` graph.
//!
//! Run this twice in the system: once when the API creates a run's steps
//! (to assign `step_index`), and once inside the Run Executor as defense
//! in depth for data loaded back out of the store (see the reference
//! engine's cycle-detection-in-validator-vs-sort design note).

use thiserror::Error;

use crate::definition::WorkflowDefinition;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopoError {
    #[error("cycle detected in workflow definition")]
    Cycle,
}

/// Sort `steps` into topological order, breaking ties by original array
/// position: whichever of two simultaneously-ready steps appeared earlier
/// in `definition.steps` is scheduled first.
///
/// Returns the steps in execution order.
pub fn topological_sort(
    definition: &WorkflowDefinition,
) -> Result<Vec<&crate::definition::StepDefinition>, TopoError> {
    let n = definition.steps.len();
    let index_of: std::collections::HashMap<&str, usize> = definition
        .steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, step) in definition.steps.iter().enumerate() {
        for dep in &step.depends_on {
            if let Some(&dep_index) = index_of.get(dep.as_str()) {
                dependents[dep_index].push(i);
                in_degree[i] += 1;
            }
            // Unknown dependencies are a validator concern, not this sort's.
        }
    }

    // Ready set, always kept sorted by original position so pops are
    // deterministic regardless of insertion order.
    let mut ready: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    ready.sort_unstable();

    let mut order = Vec::with_capacity(n);

    while !ready.is_empty() {
        let current = ready.remove(0);
        order.push(current);

        for &dependent in &dependents[current] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                let pos = ready.partition_point(|&i| i < dependent);
                ready.insert(pos, dependent);
            }
        }
    }

    if order.len() != n {
        return Err(TopoError::Cycle);
    }

    Ok(order.into_iter().map(|i| &definition.steps[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{StepConfig, StepDefinition};

    fn step(id: &str, depends_on: &[&str]) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            step_type: "task".to_string(),
            config: StepConfig {
                action: "noop".to_string(),
                duration_seconds: 0.0,
                fail_probability: 0.0,
                max_retries: 0,
            },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn def(steps: Vec<StepDefinition>) -> WorkflowDefinition {
        WorkflowDefinition {
            name: "test".to_string(),
            steps,
        }
    }

    #[test]
    fn linear_chain() {
        let d = def(vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])]);
        let sorted: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn forward_reference_is_sorted_correctly() {
        // B depends on A but appears first in the array.
        let d = def(vec![step("b", &["a"]), step("a", &[])]);
        let sorted: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sorted, vec!["a", "b"]);
    }

    #[test]
    fn ties_break_by_original_position() {
        // b and c are both ready immediately after a; b appears first.
        let d = def(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
        ]);
        let sorted: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn independent_steps_keep_array_order() {
        let d = def(vec![step("z", &[]), step("a", &[]), step("m", &[])]);
        let sorted: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sorted, vec!["z", "a", "m"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let d = def(vec![step("a", &["b"]), step("b", &["a"])]);
        assert_eq!(topological_sort(&d), Err(TopoError::Cycle));
    }

    #[test]
    fn sort_is_stable_across_repeated_calls() {
        let d = def(vec![
            step("a", &[]),
            step("b", &[]),
            step("c", &["a", "b"]),
        ]);
        let first: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        let second: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn diamond_dag() {
        let d = def(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        let sorted: Vec<&str> = topological_sort(&d)
            .unwrap()
            .into_iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(sorted.first(), Some(&"a"));
        assert_eq!(sorted.last(), Some(&"d"));
        assert_eq!(sorted.len(), 4);
    }
}
