//! Dependency-graph checks and ordering over workflow nodes.

use std::collections::{HashMap, HashSet};

use skein_core::error::{Result, SkeinError};

use super::node::WorkflowNode;

/// Check that `nodes` forms a valid DAG.
///
/// Fails on duplicate ids, a dependency on an unknown node, an input that
/// names the output of a node not listed as a dependency, or a cycle.
pub fn validate(nodes: &[WorkflowNode]) -> Result<()> {
    let mut seen = HashSet::new();
    for node in nodes {
        if node.id.trim().is_empty() {
            return Err(SkeinError::WorkflowParse("node with empty id".to_string()));
        }
        if !seen.insert(node.id.as_str()) {
            return Err(SkeinError::WorkflowParse(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
    }

    for node in nodes {
        for dep in &node.dependencies {
            if !seen.contains(dep.as_str()) {
                return Err(SkeinError::UnknownDependency {
                    node: node.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    check_input_sources(nodes)?;
    topological_order(nodes).map(|_| ())
}

/// Deterministic topological order of node ids.
///
/// Among ready nodes the one declared first wins. Fails with
/// [`SkeinError::DependencyCycle`] naming the nodes that sit on a cycle.
pub fn topological_order(nodes: &[WorkflowNode]) -> Result<Vec<String>> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![vec![]; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for dep in &node.dependencies {
            if let Some(&d) = index.get(dep.as_str()) {
                in_degree[i] += 1;
                dependents[d].push(i);
            }
        }
    }

    let mut done = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = (0..nodes.len()).find(|&i| !done[i] && in_degree[i] == 0) {
        done[next] = true;
        order.push(nodes[next].id.clone());
        for &d in &dependents[next] {
            in_degree[d] -= 1;
        }
    }

    if order.len() == nodes.len() {
        return Ok(order);
    }

    Err(SkeinError::DependencyCycle(cycle_members(nodes, &done, &dependents)))
}

/// Nodes left after Kahn's algorithm, minus those that only hang off a cycle.
fn cycle_members(nodes: &[WorkflowNode], done: &[bool], dependents: &[Vec<usize>]) -> Vec<String> {
    let mut remaining: Vec<bool> = done.iter().map(|d| !d).collect();
    loop {
        let leaf = (0..nodes.len())
            .find(|&i| remaining[i] && !dependents[i].iter().any(|&d| remaining[d]));
        match leaf {
            Some(i) => remaining[i] = false,
            None => break,
        }
    }
    nodes
        .iter()
        .zip(remaining)
        .filter(|(_, r)| *r)
        .map(|(n, _)| n.id.clone())
        .collect()
}

/// An input named after another node's output must come from a listed dependency.
fn check_input_sources(nodes: &[WorkflowNode]) -> Result<()> {
    let producers: HashMap<&str, &str> = nodes
        .iter()
        .map(|n| (n.output.name.as_str(), n.id.as_str()))
        .collect();

    for node in nodes {
        for item in &node.input.items {
            if let Some(&source) = producers.get(item.name.as_str()) {
                if source != node.id && !node.dependencies.iter().any(|d| d == source) {
                    return Err(SkeinError::UnlistedDependency {
                        node: node.id.clone(),
                        source_node: source.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> WorkflowNode {
        WorkflowNode::new(id, id).with_dependencies(deps)
    }

    #[test]
    fn test_linear_order() {
        let nodes = vec![node("c", &["b"]), node("a", &[]), node("b", &["a"])];
        assert_eq!(topological_order(&nodes).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let nodes = vec![
            node("root", &[]),
            node("z", &["root"]),
            node("m", &["root"]),
            node("a", &["root"]),
            node("join", &["a", "z"]),
        ];
        assert_eq!(
            topological_order(&nodes).unwrap(),
            vec!["root", "z", "m", "a", "join"]
        );
    }

    #[test]
    fn test_cycle_detected() {
        let nodes = vec![
            node("start", &[]),
            node("a", &["start", "c"]),
            node("b", &["a"]),
            node("c", &["b"]),
            node("after", &["c"]),
        ];
        match validate(&nodes) {
            Err(SkeinError::DependencyCycle(ids)) => assert_eq!(ids, vec!["a", "b", "c"]),
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let nodes = vec![node("a", &["a"])];
        assert!(matches!(validate(&nodes), Err(SkeinError::DependencyCycle(ids)) if ids == vec!["a"]));
    }

    #[test]
    fn test_acyclic_validates() {
        let nodes = vec![node("a", &[]), node("b", &["a"]), node("c", &["a", "b"])];
        assert!(validate(&nodes).is_ok());
    }

    #[test]
    fn test_unknown_dependency() {
        let nodes = vec![node("a", &["ghost"])];
        assert!(matches!(
            validate(&nodes),
            Err(SkeinError::UnknownDependency { node, dependency }) if node == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn test_duplicate_id() {
        let nodes = vec![node("a", &[]), node("a", &[])];
        assert!(matches!(validate(&nodes), Err(SkeinError::WorkflowParse(_))));
    }

    #[test]
    fn test_unlisted_dependency_input() {
        let nodes = vec![
            node("research", &[]).with_output("findings", ""),
            node("write", &[]).with_input("findings", ""),
        ];
        assert!(matches!(
            validate(&nodes),
            Err(SkeinError::UnlistedDependency { node, source_node })
                if node == "write" && source_node == "research"
        ));
    }

    #[test]
    fn test_variable_inputs_need_no_dependency() {
        let nodes = vec![node("a", &[]).with_input("topic", "from variables")];
        assert!(validate(&nodes).is_ok());
    }

    #[test]
    fn test_empty_graph() {
        assert!(validate(&[]).is_ok());
        assert!(topological_order(&[]).unwrap().is_empty());
    }
}
