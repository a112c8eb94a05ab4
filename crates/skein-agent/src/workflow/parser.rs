use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use skein_core::error::{Result, SkeinError};

use super::dag;
use super::node::WorkflowNode;

/// Serialized form of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDescription {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    pub nodes: Vec<WorkflowNode>,
}

/// Parse and validate a workflow description. Fails closed.
///
/// When `known_tools` is given every tool an action names must be in it.
pub fn parse(json: &str, known_tools: Option<&[String]>) -> Result<WorkflowDescription> {
    let mut desc: WorkflowDescription = serde_json::from_str(json)
        .map_err(|e| SkeinError::WorkflowParse(e.to_string()))?;

    if desc.id.trim().is_empty() {
        return Err(SkeinError::WorkflowParse("workflow id is empty".to_string()));
    }

    for node in desc.nodes.iter_mut() {
        if node.action.name.is_empty() {
            node.action.name = node.id.clone();
        }
        if node.output.name.trim().is_empty() {
            return Err(SkeinError::WorkflowParse(format!(
                "node '{}' has an empty output name",
                node.id
            )));
        }
    }

    if let Some(known) = known_tools {
        check_tools(&desc.nodes, known)?;
    }

    dag::validate(&desc.nodes)?;

    debug!(
        workflow_id = %desc.id,
        nodes = desc.nodes.len(),
        "Parsed workflow description"
    );
    Ok(desc)
}

fn check_tools(nodes: &[WorkflowNode], known: &[String]) -> Result<()> {
    for node in nodes {
        for tool in &node.action.tools {
            if !known.iter().any(|k| k == tool) {
                return Err(SkeinError::InvalidTool(format!(
                    "node '{}' uses unknown tool '{}'",
                    node.id, tool
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_test_utils::TWO_NODE_WORKFLOW;

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_two_node_workflow() {
        let desc = parse(TWO_NODE_WORKFLOW, Some(&tools(&["lookup"]))).unwrap();
        assert_eq!(desc.id, "wf-article");
        assert_eq!(desc.nodes.len(), 2);
        assert_eq!(desc.variables["topic"], "Rust async");
        assert_eq!(desc.nodes[1].dependencies, vec!["research"]);
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let err = parse(TWO_NODE_WORKFLOW, Some(&tools(&["search"]))).unwrap_err();
        assert!(matches!(err, SkeinError::InvalidTool(msg) if msg.contains("lookup")));
    }

    #[test]
    fn test_tool_check_skipped_without_registry() {
        assert!(parse(TWO_NODE_WORKFLOW, None).is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let json = r#"{"id": "wf", "nodes": []}"#;
        assert!(matches!(parse(json, None), Err(SkeinError::WorkflowParse(_))));
    }

    #[test]
    fn test_missing_output_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "dependencies": [], "action": {"type": "prompt"}}
        ]}"#;
        assert!(matches!(parse(json, None), Err(SkeinError::WorkflowParse(_))));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [], "edges": []}"#;
        assert!(matches!(parse(json, None), Err(SkeinError::WorkflowParse(_))));
    }

    #[test]
    fn test_undeclared_dependency_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "dependencies": ["b"], "action": {"type": "prompt"}, "output": {"name": "x", "description": ""}}
        ]}"#;
        assert!(matches!(
            parse(json, None),
            Err(SkeinError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn test_action_name_defaults_to_node_id() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "dependencies": [], "action": {"type": "prompt"}, "output": {"name": "x", "description": ""}}
        ]}"#;
        let desc = parse(json, None).unwrap();
        assert_eq!(desc.nodes[0].action.name, "a");
    }

    #[test]
    fn test_node_without_dependencies_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "action": {"type": "prompt"}, "output": {"name": "out", "description": "d"}}
        ]}"#;
        let err = parse(json, None).unwrap_err();
        assert!(matches!(err, SkeinError::WorkflowParse(msg) if msg.contains("dependencies")));
    }

    #[test]
    fn test_output_without_description_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "dependencies": [], "action": {"type": "prompt"}, "output": {"name": "out"}}
        ]}"#;
        let err = parse(json, None).unwrap_err();
        assert!(matches!(err, SkeinError::WorkflowParse(msg) if msg.contains("description")));
    }

    #[test]
    fn test_unknown_node_field_rejected() {
        let json = r#"{"id": "wf", "name": "W", "nodes": [
            {"id": "a", "name": "A", "dependencies": [], "action": {"type": "prompt"},
             "output": {"name": "out", "description": "d"}, "edges": []}
        ]}"#;
        assert!(matches!(parse(json, None), Err(SkeinError::WorkflowParse(_))));
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(parse("nodes: []", None), Err(SkeinError::WorkflowParse(_))));
    }
}
