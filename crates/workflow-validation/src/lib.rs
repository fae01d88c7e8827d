//! Validates a [`WorkflowDefinition`] before it is ever persisted.
//!
//! Mirrors the reference model validator's contract: reject empty
//! `steps`, duplicate ids, dangling `depends_on` references, and cycles.
//! Forward references (a step depending on one later in the array) are
//! explicitly permitted — only the final topological position matters.

use std::collections::HashSet;

use thiserror::Error;
use workflow_model::{topological_sort, TopoError, WorkflowDefinition};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workflow must have at least one step")]
    EmptySteps,

    #[error("duplicate step id: '{0}'")]
    DuplicateStepId(String),

    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("workflow definition contains a cycle")]
    Cycle,
}

/// Validate a definition. On success, returns nothing — callers that
/// also need the topological order should call
/// [`workflow_model::topological_sort`] themselves, since validation
/// and ordering are separate concerns kept in separate crates.
pub fn validate(definition: &WorkflowDefinition) -> Result<(), ValidationError> {
    if definition.steps.is_empty() {
        return Err(ValidationError::EmptySteps);
    }

    let mut seen_ids: HashSet<&str> = HashSet::new();
    for step in &definition.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(ValidationError::DuplicateStepId(step.id.clone()));
        }
    }

    for step in &definition.steps {
        for dep in &step.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step_id: step.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    match topological_sort(definition) {
        Ok(_) => Ok(()),
        Err(TopoError::Cycle) => Err(ValidationError::Cycle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflow_model::{StepConfig, StepDefinition};

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
    fn rejects_empty_steps() {
        let d = def(vec![]);
        assert_eq!(validate(&d), Err(ValidationError::EmptySteps));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let d = def(vec![step("a", &[]), step("a", &[])]);
        assert_eq!(
            validate(&d),
            Err(ValidationError::DuplicateStepId("a".to_string()))
        );
    }

    #[test]
    fn rejects_dangling_dependency() {
        let d = def(vec![step("a", &["ghost"])]);
        assert_eq!(
            validate(&d),
            Err(ValidationError::UnknownDependency {
                step_id: "a".to_string(),
                dependency: "ghost".to_string(),
            })
        );
    }

    #[test]
    fn accepts_forward_reference() {
        // B depends on A, but A appears later in the array.
        let d = def(vec![step("b", &["a"]), step("a", &[])]);
        assert!(validate(&d).is_ok());
    }

    #[test]
    fn rejects_cycle() {
        let d = def(vec![step("a", &["b"]), step("b", &["a"])]);
        assert_eq!(validate(&d), Err(ValidationError::Cycle));
    }

    #[test]
    fn accepts_single_step() {
        let d = def(vec![step("solo", &[])]);
        assert!(validate(&d).is_ok());
    }

    #[test]
    fn accepts_diamond() {
        let d = def(vec![
            step("a", &[]),
            step("b", &["a"]),
            step("c", &["a"]),
            step("d", &["b", "c"]),
        ]);
        assert!(validate(&d).is_ok());
    }
}
