//! Validation utilities for workflow graph construction.

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, Result};
use crate::ids::TaskId;
use crate::models::TaskDef;

/// Validates a list of task definitions before a workflow is created.
pub struct GraphValidator;

impl GraphValidator {
    /// Ensure every `task_id` is unique, every dependency references a
    /// defined task, and the dependency graph is acyclic. Returns a
    /// topological order on success (used by tests/diagnostics; the
    /// scheduler itself walks the ready set rather than a fixed order).
    pub fn validate(task_defs: &[TaskDef]) -> Result<Vec<TaskId>> {
        let mut seen = HashSet::new();
        for def in task_defs {
            if !seen.insert(&def.task_id) {
                return Err(CoreError::dependency(format!("duplicate task_id '{}'", def.task_id)));
            }
        }

        let by_id: HashMap<&TaskId, &TaskDef> = task_defs.iter().map(|d| (&d.task_id, d)).collect();
        for def in task_defs {
            for dep in &def.dependencies {
                if !by_id.contains_key(dep) {
                    return Err(CoreError::dependency(format!(
                        "task '{}' depends on undefined task '{}'",
                        def.task_id, dep
                    )));
                }
            }
        }

        Self::topological_order(task_defs, &by_id)
    }

    /// Kahn's algorithm: repeatedly remove nodes with in-degree zero. Any
    /// task left unvisited once the queue empties is part of a cycle.
    fn topological_order(
        task_defs: &[TaskDef],
        by_id: &HashMap<&TaskId, &TaskDef>,
    ) -> Result<Vec<TaskId>> {
        let mut in_degree: HashMap<&TaskId, usize> =
            task_defs.iter().map(|d| (&d.task_id, d.dependencies.len())).collect();
        let mut dependents: HashMap<&TaskId, Vec<&TaskId>> = HashMap::new();
        for def in task_defs {
            for dep in &def.dependencies {
                dependents.entry(dep).or_default().push(&def.task_id);
            }
        }

        let mut queue: Vec<&TaskId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();
        queue.sort();

        let mut order = Vec::with_capacity(task_defs.len());
        let mut cursor = 0;
        while cursor < queue.len() {
            let current = queue[cursor];
            cursor += 1;
            order.push(current.clone());
            if let Some(deps) = dependents.get(current) {
                let mut newly_ready = Vec::new();
                for dependent in deps {
                    let degree = in_degree.get_mut(dependent).expect("dependent must be tracked");
                    *degree -= 1;
                    if *degree == 0 {
                        newly_ready.push(*dependent);
                    }
                }
                newly_ready.sort();
                queue.extend(newly_ready);
            }
        }

        if order.len() != task_defs.len() {
            let stuck: Vec<&str> = by_id
                .keys()
                .filter(|id| !order.contains(id))
                .map(|id| id.as_str())
                .collect();
            return Err(CoreError::dependency(format!(
                "cycle detected among tasks: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RetryPolicy;
    use serde_json::json;

    fn def(id: &str, deps: &[&str]) -> TaskDef {
        TaskDef {
            task_id: TaskId::new(id),
            agent_type: "noop".into(),
            dependencies: deps.iter().map(|d| TaskId::new(*d)).collect(),
            retry_policy: RetryPolicy::default(),
            timeout_seconds: None,
            allow_failure: false,
            input_data: json!({}),
        }
    }

    #[test]
    fn diamond_graph_validates() {
        let defs = vec![def("a", &[]), def("b", &["a"]), def("c", &["a"]), def("d", &["b", "c"])];
        let order = GraphValidator::validate(&defs).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], TaskId::new("a"));
        assert_eq!(order[3], TaskId::new("d"));
    }

    #[test]
    fn cycle_is_rejected() {
        let defs = vec![def("a", &["b"]), def("b", &["a"])];
        let err = GraphValidator::validate(&defs).unwrap_err();
        assert!(err.is_dependency());
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let defs = vec![def("a", &["ghost"])];
        let err = GraphValidator::validate(&defs).unwrap_err();
        assert!(err.is_dependency());
    }

    #[test]
    fn duplicate_task_id_is_rejected() {
        let defs = vec![def("a", &[]), def("a", &[])];
        let err = GraphValidator::validate(&defs).unwrap_err();
        assert!(err.is_dependency());
    }
}
