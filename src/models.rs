//! # Workflow Graph Models
//!
//! Node and edge structures for workflow definitions as the workflow
//! server serializes them. The worker consumes these when invoking peer
//! functions: the RPC client reads the target function coordinates and
//! node type from a [`Node`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::function::FunctionDefinition;

/// A workflow definition: nodes connected by edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workflow {
    pub edges: Vec<Edge>,
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub metadata: Metadata,
}

/// Additional information about the workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "workflowName")]
    pub workflow_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A connection between two nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    #[serde(rename = "sourceHandle")]
    pub source_handle: String,
    pub target: String,
    #[serde(rename = "targetHandle")]
    pub target_handle: String,
}

/// A node in the workflow graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "is_false")]
    pub dragging: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<i64>,
    pub id: String,
    pub position: Position,
    #[serde(
        rename = "positionAbsolute",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub position_absolute: Option<Position>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub selected: bool,
    /// Node kind; `flow_tool` nodes are invoked as workflow fragments
    /// rather than named functions.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<i64>,
}

/// The main configuration of a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(rename = "connectedInputs")]
    pub connected_inputs: HashMap<String, bool>,
    #[serde(rename = "workflowName")]
    pub workflow_name: String,
    pub description: String,
    /// Coordinates of the function this node invokes.
    pub function: FunctionDefinition,
    pub inputs: Vec<NodeField>,
    pub label: String,
    pub outputs: Vec<NodeField>,
}

/// Input or output configuration on a node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeField {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(
        rename = "defaultValue",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub default_value: Option<serde_json::Value>,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub ui_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<IoValidation>,
}

/// Validation bounds for node inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IoValidation {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub max: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min: f64,
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &f64) -> bool {
    *value == 0.0
}
