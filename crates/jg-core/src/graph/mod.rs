//! Workflow graph: the editor-authored node/edge set walked by the engines.

use crate::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid config for node {node_id}: {message}")]
    InvalidConfig { node_id: String, message: String },
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    #[error("edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },
    #[error("malformed workflow json: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// WorkflowGraph: top-level graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// Workflow identifier; generated when the document carries none.
    #[serde(default = "default_workflow_id")]
    pub id: String,

    /// Display name shown in history listings.
    #[serde(default)]
    pub name: String,

    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

fn default_workflow_id() -> String {
    format!("wf-{}", Uuid::new_v4())
}

impl WorkflowGraph {
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check node id uniqueness and that every edge endpoint exists.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(GraphError::DuplicateNode(node.id.clone()));
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(GraphError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node_id: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// First node (in declaration order) that can start a run.
    pub fn entry_node(&self) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.kind.is_entry())
    }

    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a EdgeSpec> + 'a {
        self.edges.iter().filter(move |e| e.source == node_id)
    }

    /// Resolve the node that follows `from`.
    ///
    /// Without a branch result the first outgoing edge wins. With one, the
    /// first edge labelled with that result wins, falling back to the first
    /// unlabelled edge.
    pub fn successor(&self, from: &str, branch: Option<bool>) -> Option<&NodeSpec> {
        let edge = match branch {
            None => self.outgoing(from).next(),
            Some(result) => self
                .outgoing(from)
                .find(|e| e.branch_label() == Some(result))
                .or_else(|| self.outgoing(from).find(|e| e.branch_label().is_none())),
        }?;
        self.node(&edge.target)
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    #[serde(default = "default_edge_id")]
    pub id: String,
    pub source: String,
    pub target: String,
    /// Decision outcome this edge is taken on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<bool>,
    /// Editor handle name; `"true"` / `"false"` act as a branch label.
    #[serde(
        default,
        rename = "sourceHandle",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
}

fn default_edge_id() -> String {
    Uuid::new_v4().to_string()
}

impl EdgeSpec {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
            branch: None,
            source_handle: None,
        }
    }

    pub fn on_branch(mut self, branch: bool) -> Self {
        self.branch = Some(branch);
        self
    }

    pub fn branch_label(&self) -> Option<bool> {
        self.branch.or(match self.source_handle.as_deref() {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A graph node. Serialized in the editor's `{id, type, data}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct NodeSpec {
    pub id: String,
    pub label: Option<String>,
    pub kind: NodeKind,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Label if set, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Closed set of node roles, each with its own config payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Input,
    DataInput,
    Decision(RuleConfig),
    RuleEngine(RuleConfig),
    Action(ActionConfig),
    ApiCall(ApiCallConfig),
    DataTransform(TransformConfig),
    LlmJudgment(JudgmentConfig),
    Notification(NotificationConfig),
    Output,
    ResultOutput,
    /// A type string outside the known set. Kept so it can fail at dispatch.
    Unsupported { type_name: String, config: Context },
}

impl NodeKind {
    pub fn type_name(&self) -> &str {
        match self {
            NodeKind::Input => "input",
            NodeKind::DataInput => "data-input",
            NodeKind::Decision(_) => "decision",
            NodeKind::RuleEngine(_) => "rule-engine",
            NodeKind::Action(_) => "action",
            NodeKind::ApiCall(_) => "api-call",
            NodeKind::DataTransform(_) => "data-transform",
            NodeKind::LlmJudgment(_) => "llm-judgment",
            NodeKind::Notification(_) => "notification",
            NodeKind::Output => "output",
            NodeKind::ResultOutput => "result-output",
            NodeKind::Unsupported { type_name, .. } => type_name,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, NodeKind::Input | NodeKind::DataInput)
    }

    /// True for the type names of terminal nodes, including editor aliases.
    pub fn is_terminal_type(type_name: &str) -> bool {
        matches!(type_name, "output" | "result-output" | "data-output")
    }

    fn from_parts(type_name: &str, config: Context) -> Result<Self, serde_json::Error> {
        Ok(match type_name {
            "input" => NodeKind::Input,
            "data-input" => NodeKind::DataInput,
            "decision" | "condition" => NodeKind::Decision(parse_config(config)?),
            "rule-engine" => NodeKind::RuleEngine(parse_config(config)?),
            "action" => NodeKind::Action(parse_config(config)?),
            "api-call" => NodeKind::ApiCall(parse_config(config)?),
            "data-transform" => NodeKind::DataTransform(parse_config(config)?),
            "llm-judgment" => NodeKind::LlmJudgment(parse_config(config)?),
            "notification" => NodeKind::Notification(parse_config(config)?),
            "output" | "data-output" => NodeKind::Output,
            "result-output" => NodeKind::ResultOutput,
            other => NodeKind::Unsupported {
                type_name: other.to_string(),
                config,
            },
        })
    }

    fn config(&self) -> Context {
        let value = match self {
            NodeKind::Decision(c) | NodeKind::RuleEngine(c) => serde_json::to_value(c),
            NodeKind::Action(c) => serde_json::to_value(c),
            NodeKind::ApiCall(c) => serde_json::to_value(c),
            NodeKind::DataTransform(c) => serde_json::to_value(c),
            NodeKind::LlmJudgment(c) => serde_json::to_value(c),
            NodeKind::Notification(c) => serde_json::to_value(c),
            NodeKind::Unsupported { config, .. } => return config.clone(),
            NodeKind::Input
            | NodeKind::DataInput
            | NodeKind::Output
            | NodeKind::ResultOutput => return Context::new(),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Context::new(),
        }
    }
}

fn parse_config<T: DeserializeOwned>(config: Context) -> Result<T, serde_json::Error> {
    serde_json::from_value(Value::Object(config))
}

// ---------------------------------------------------------------------------
// Per-role config payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default)]
    pub rule: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiCallConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default, rename = "transformType")]
    pub transform_type: String,
    /// Record field used by `filter` and `aggregate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgmentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------------
// Editor wire shape
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    data: Context,
}

impl TryFrom<RawNode> for NodeSpec {
    type Error = GraphError;

    fn try_from(raw: RawNode) -> Result<Self, Self::Error> {
        let mut data = raw.data;
        let label = match data.remove("label") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        // Nested `data.config` wins over flat `data` fields.
        let mut config = match data.remove("config") {
            Some(Value::Object(map)) => map,
            _ => Context::new(),
        };
        for (key, value) in data {
            config.entry(key).or_insert(value);
        }

        let kind = NodeKind::from_parts(&raw.node_type, config).map_err(|e| {
            GraphError::InvalidConfig {
                node_id: raw.id.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(NodeSpec {
            id: raw.id,
            label,
            kind,
        })
    }
}

impl From<NodeSpec> for RawNode {
    fn from(node: NodeSpec) -> Self {
        let mut data = node.kind.config();
        if let Some(label) = node.label {
            data.insert("label".into(), Value::String(label));
        }
        RawNode {
            id: node.id,
            node_type: node.kind.type_name().to_string(),
            data,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn linear_graph() -> WorkflowGraph {
        WorkflowGraph {
            id: "wf-1".into(),
            name: "linear".into(),
            nodes: vec![
                NodeSpec::new("1", NodeKind::Input),
                NodeSpec::new(
                    "2",
                    NodeKind::Decision(RuleConfig {
                        rule: "temperature > 90".into(),
                    }),
                ),
                NodeSpec::new("3", NodeKind::Output),
                NodeSpec::new("4", NodeKind::ResultOutput),
            ],
            edges: vec![EdgeSpec::new("1", "2"), EdgeSpec::new("2", "3")],
        }
    }

    #[test]
    fn parses_editor_node_shape() {
        let graph = WorkflowGraph::from_json(
            &json!({
                "id": "wf-editor",
                "name": "sensor check",
                "nodes": [
                    {"id": "n1", "type": "data-input", "data": {"label": "센서 데이터 입력"}},
                    {"id": "n2", "type": "condition", "data": {"label": "온도 체크", "rule": "temperature > 80"}},
                    {"id": "n3", "type": "notification", "data": {
                        "label": "경고 알림",
                        "config": {"channel": "slack", "message": "고온 경고"}
                    }},
                    {"id": "n4", "type": "data-output", "data": {}}
                ],
                "edges": [
                    {"id": "e1", "source": "n1", "target": "n2"},
                    {"id": "e2", "source": "n2", "target": "n3", "sourceHandle": "true"}
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.nodes[0].kind, NodeKind::DataInput);
        assert_eq!(graph.nodes[0].display_name(), "센서 데이터 입력");
        assert_eq!(
            graph.nodes[1].kind,
            NodeKind::Decision(RuleConfig {
                rule: "temperature > 80".into()
            })
        );
        match &graph.nodes[2].kind {
            NodeKind::Notification(cfg) => {
                assert_eq!(cfg.channel, "slack");
                assert_eq!(cfg.message, "고온 경고");
            }
            other => panic!("expected notification, got {other:?}"),
        }
        assert_eq!(graph.nodes[3].kind, NodeKind::Output);
        assert_eq!(graph.edges[1].branch_label(), Some(true));
        graph.validate().unwrap();
    }

    #[test]
    fn unknown_type_survives_round_trip() {
        let node: NodeSpec =
            serde_json::from_value(json!({"id": "x", "type": "bogus", "data": {"foo": 1}})).unwrap();
        assert_eq!(node.kind.type_name(), "bogus");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "bogus");
        assert_eq!(back["data"]["foo"], 1);
    }

    #[test]
    fn wrongly_typed_config_is_rejected() {
        let err = serde_json::from_value::<NodeSpec>(
            json!({"id": "d", "type": "decision", "data": {"rule": 42}}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid config for node d"));
    }

    #[test]
    fn serializes_canonical_type_names() {
        let node = NodeSpec::new(
            "t",
            NodeKind::DataTransform(TransformConfig {
                transform_type: "map".into(),
                field: None,
            }),
        )
        .with_label("Transform");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(
            value,
            json!({"id": "t", "type": "data-transform", "data": {"label": "Transform", "transformType": "map"}})
        );
    }

    #[test]
    fn successor_follows_first_edge() {
        let graph = linear_graph();
        assert_eq!(graph.successor("1", None).map(|n| n.id.as_str()), Some("2"));
        assert!(graph.successor("3", None).is_none());
    }

    #[test]
    fn successor_selects_labelled_branch() {
        let mut graph = linear_graph();
        graph.edges = vec![
            EdgeSpec::new("2", "4"),
            EdgeSpec::new("2", "3").on_branch(false),
        ];
        // false matches the labelled edge
        assert_eq!(graph.successor("2", Some(false)).map(|n| n.id.as_str()), Some("3"));
        // true falls back to the unlabelled edge
        assert_eq!(graph.successor("2", Some(true)).map(|n| n.id.as_str()), Some("4"));
        // no branch result: first outgoing edge
        assert_eq!(graph.successor("2", None).map(|n| n.id.as_str()), Some("4"));
    }

    #[test]
    fn entry_node_is_first_input_role() {
        let mut graph = linear_graph();
        assert_eq!(graph.entry_node().map(|n| n.id.as_str()), Some("1"));
        graph.nodes.retain(|n| !n.kind.is_entry());
        assert!(graph.entry_node().is_none());
    }

    #[test]
    fn validate_rejects_duplicates_and_dangling_edges() {
        let mut graph = linear_graph();
        graph.nodes.push(NodeSpec::new("1", NodeKind::Output));
        assert!(matches!(graph.validate(), Err(GraphError::DuplicateNode(id)) if id == "1"));

        let mut graph = linear_graph();
        graph.edges.push(EdgeSpec::new("3", "missing"));
        assert!(matches!(
            graph.validate(),
            Err(GraphError::DanglingEdge { node_id, .. }) if node_id == "missing"
        ));
    }
}
