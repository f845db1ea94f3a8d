use std::collections::{HashMap, HashSet};

use orchestrator_core::{OrchestratorError, OrchestratorResult, ServiceDependency};

/// 深度优先后序遍历得到的依赖顺序：每个服务排在它依赖的服务之后
///
/// 只考虑目标位于 `ids` 内的依赖边，集合外的依赖被忽略。遇到环时返回
/// `CircularDependency`，其中的服务 id 位于环上。
pub fn topological_order(
    ids: &[String],
    dependencies: &HashMap<String, Vec<ServiceDependency>>,
) -> OrchestratorResult<Vec<String>> {
    let in_set: HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut visiting = HashSet::new();
    let mut visited = HashSet::new();
    let mut order = Vec::with_capacity(ids.len());

    for id in ids {
        visit(
            id,
            &in_set,
            dependencies,
            &mut visiting,
            &mut visited,
            &mut order,
        )?;
    }

    Ok(order)
}

fn visit<'a>(
    id: &'a str,
    in_set: &HashSet<&str>,
    dependencies: &'a HashMap<String, Vec<ServiceDependency>>,
    visiting: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
    order: &mut Vec<String>,
) -> OrchestratorResult<()> {
    if visited.contains(id) {
        return Ok(());
    }
    if !visiting.insert(id) {
        return Err(OrchestratorError::circular_dependency(id));
    }

    if let Some(deps) = dependencies.get(id) {
        for dep in deps {
            if in_set.contains(dep.service_id.as_str()) {
                visit(
                    &dep.service_id,
                    in_set,
                    dependencies,
                    visiting,
                    visited,
                    order,
                )?;
            }
        }
    }

    visiting.remove(id);
    visited.insert(id);
    order.push(id.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> (Vec<String>, HashMap<String, Vec<ServiceDependency>>) {
        let ids = edges.iter().map(|(id, _)| id.to_string()).collect();
        let deps = edges
            .iter()
            .map(|(id, targets)| {
                (
                    id.to_string(),
                    targets.iter().map(|t| ServiceDependency::required(*t)).collect(),
                )
            })
            .collect();
        (ids, deps)
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|x| x == id).unwrap()
    }

    #[test]
    fn test_diamond_respects_every_edge() {
        let (ids, deps) = graph(&[
            ("app", &["cache", "db"]),
            ("cache", &["config"]),
            ("db", &["config"]),
            ("config", &[]),
        ]);

        let order = topological_order(&ids, &deps).unwrap();
        assert_eq!(order.len(), 4);
        for (id, targets) in [("app", vec!["cache", "db"]), ("cache", vec!["config"]), ("db", vec!["config"])] {
            for target in targets {
                assert!(position(&order, target) < position(&order, id));
            }
        }
    }

    #[test]
    fn test_dependencies_outside_set_are_ignored() {
        let (_, deps) = graph(&[("b", &["a", "external"]), ("a", &[])]);
        let ids = vec!["b".to_string()];

        let order = topological_order(&ids, &deps).unwrap();
        assert_eq!(order, vec!["b".to_string()]);
    }

    #[test]
    fn test_cycle_names_participant() {
        let (ids, deps) = graph(&[("x", &["y"]), ("y", &["z"]), ("z", &["x"]), ("w", &[])]);

        match topological_order(&ids, &deps) {
            Err(OrchestratorError::CircularDependency { service_id }) => {
                assert!(["x", "y", "z"].contains(&service_id.as_str()));
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let (ids, deps) = graph(&[("solo", &["solo"])]);
        assert!(matches!(
            topological_order(&ids, &deps),
            Err(OrchestratorError::CircularDependency { .. })
        ));
    }
}
