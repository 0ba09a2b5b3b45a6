//! Trace tree model and depth-first flattening
use crate::error::{Result, TracegrepError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Stable identity of a node, assigned in depth-first order when the tree is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanValue {
    pub span_id: String,
    pub op: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionValue {
    pub event_id: String,
    pub transaction: String,
    #[serde(rename = "transaction.op")]
    pub op: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutogroupValue {
    pub op: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub group_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub event_id: String,
    pub level: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingInstrumentationValue {
    #[serde(default)]
    pub duration_ms: f64,
}

/// Payload of a trace row, discriminated by node kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeValue {
    Span(SpanValue),
    Transaction(TransactionValue),
    Autogroup(AutogroupValue),
    Error(ErrorValue),
    MissingInstrumentation(MissingInstrumentationValue),
}

impl NodeValue {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeValue::Span(_) => "span",
            NodeValue::Transaction(_) => "transaction",
            NodeValue::Autogroup(_) => "autogroup",
            NodeValue::Error(_) => "error",
            NodeValue::MissingInstrumentation(_) => "missing_instrumentation",
        }
    }

    /// Span id or event id, when the kind carries one
    pub fn identifier(&self) -> Option<&str> {
        match self {
            NodeValue::Span(span) => Some(&span.span_id),
            NodeValue::Transaction(txn) => Some(&txn.event_id),
            NodeValue::Error(error) => Some(&error.event_id),
            NodeValue::Autogroup(_) | NodeValue::MissingInstrumentation(_) => None,
        }
    }

    /// Human readable row label
    pub fn label(&self) -> String {
        match self {
            NodeValue::Span(span) => join_label(span.op.as_deref(), span.description.as_deref()),
            NodeValue::Transaction(txn) => join_label(txn.op.as_deref(), Some(&txn.transaction)),
            NodeValue::Autogroup(group) => format!(
                "{} ({}x)",
                join_label(group.op.as_deref(), group.description.as_deref()),
                group.group_count
            ),
            NodeValue::Error(error) => format!(
                "[{}] {}",
                error.level.as_deref().unwrap_or("unknown"),
                error.title.as_deref().unwrap_or("<untitled>")
            ),
            NodeValue::MissingInstrumentation(gap) => {
                format!("Missing instrumentation ({:.0}ms)", gap.duration_ms)
            }
        }
    }
}

fn join_label(op: Option<&str>, description: Option<&str>) -> String {
    match (op, description) {
        (Some(op), Some(description)) => format!("{op} - {description}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => "<unknown>".to_string(),
    }
}

/// One row of the flattened trace tree
#[derive(Debug, Clone, PartialEq)]
pub struct TraceTreeNode {
    pub id: NodeId,
    pub depth: usize,
    pub value: NodeValue,
    pub expanded: bool,
    pub child_count: usize,
}

pub type NodeRef = Rc<TraceTreeNode>;

/// Nested node description, as found in trace JSON files
#[derive(Debug, Clone, Deserialize)]
pub struct TraceNodeInput {
    #[serde(flatten)]
    pub value: NodeValue,
    #[serde(default)]
    pub children: Vec<TraceNodeInput>,
    #[serde(default = "default_expanded")]
    pub expanded: bool,
}

fn default_expanded() -> bool {
    true
}

impl TraceNodeInput {
    pub fn new(value: NodeValue) -> Self {
        Self {
            value,
            children: Vec::new(),
            expanded: true,
        }
    }

    pub fn with_children(mut self, children: Vec<TraceNodeInput>) -> Self {
        self.children = children;
        self
    }

    pub fn collapsed(mut self) -> Self {
        self.expanded = false;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TraceDocument {
    nodes: Vec<TraceNodeInput>,
}

#[derive(Debug, Clone)]
struct TreeEntry {
    id: NodeId,
    value: NodeValue,
    expanded: bool,
    children: Vec<TreeEntry>,
}

/// Trace tree that keeps its visible rows flattened in depth-first order
///
/// The flattened list is rebuilt whenever a node is expanded or collapsed.
/// Any scan running over a previous list must be restarted by the caller.
#[derive(Debug)]
pub struct TraceTree {
    roots: Vec<TreeEntry>,
    node_count: usize,
    list: Rc<[NodeRef]>,
}

impl TraceTree {
    pub fn from_nodes(nodes: Vec<TraceNodeInput>) -> Self {
        let mut next_id = 0;
        let roots = nodes
            .into_iter()
            .map(|node| Self::assign_ids(node, &mut next_id))
            .collect();

        let mut tree = Self {
            roots,
            node_count: next_id,
            list: Rc::from(Vec::new()),
        };
        tree.rebuild();
        tree
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let document: TraceDocument = serde_json::from_str(content)?;
        Ok(Self::from_nodes(document.nodes))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| TracegrepError::TraceLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;

        let document: TraceDocument =
            serde_json::from_str(&content).map_err(|e| TracegrepError::TraceLoad {
                path: path.to_path_buf(),
                source: Box::new(e),
            })?;

        let tree = Self::from_nodes(document.nodes);
        log::debug!(
            "Loaded trace {} ({} nodes, {} visible)",
            path.display(),
            tree.node_count,
            tree.list.len()
        );
        Ok(tree)
    }

    fn assign_ids(node: TraceNodeInput, next_id: &mut usize) -> TreeEntry {
        let id = NodeId(*next_id);
        *next_id += 1;

        let children = node
            .children
            .into_iter()
            .map(|child| Self::assign_ids(child, next_id))
            .collect();

        TreeEntry {
            id,
            value: node.value,
            expanded: node.expanded,
            children,
        }
    }

    fn flatten(entry: &TreeEntry, depth: usize, out: &mut Vec<NodeRef>) {
        out.push(Rc::new(TraceTreeNode {
            id: entry.id,
            depth,
            value: entry.value.clone(),
            expanded: entry.expanded,
            child_count: entry.children.len(),
        }));

        if entry.expanded {
            for child in &entry.children {
                Self::flatten(child, depth + 1, out);
            }
        }
    }

    fn rebuild(&mut self) {
        let mut list = Vec::with_capacity(self.node_count);
        for root in &self.roots {
            Self::flatten(root, 0, &mut list);
        }
        self.list = Rc::from(list);
    }

    /// Visible rows in depth-first order
    pub fn list(&self) -> Rc<[NodeRef]> {
        Rc::clone(&self.list)
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Number of nodes in the tree, including rows hidden under collapsed parents
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn get(&self, index: usize) -> Option<&NodeRef> {
        self.list.get(index)
    }

    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.list.iter().position(|node| node.id == id)
    }

    /// Expand or collapse a node. Returns false when nothing changed.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
        fn visit(entries: &mut [TreeEntry], id: NodeId, expanded: bool) -> Option<bool> {
            for entry in entries.iter_mut() {
                if entry.id == id {
                    let changed = entry.expanded != expanded;
                    entry.expanded = expanded;
                    return Some(changed);
                }
                if let Some(changed) = visit(&mut entry.children, id, expanded) {
                    return Some(changed);
                }
            }
            None
        }

        let changed = visit(&mut self.roots, id, expanded).unwrap_or(false);
        if changed {
            self.rebuild();
        }
        changed
    }

    pub fn expand_all(&mut self) {
        fn visit(entries: &mut [TreeEntry]) {
            for entry in entries.iter_mut() {
                entry.expanded = true;
                visit(&mut entry.children);
            }
        }

        visit(&mut self.roots);
        self.rebuild();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: &str = r#"{
        "nodes": [
            {
                "type": "transaction",
                "event_id": "txn1",
                "transaction": "GET /api/users",
                "transaction.op": "http.server",
                "children": [
                    { "type": "span", "span_id": "s1", "op": "db", "description": "SELECT * FROM users" },
                    {
                        "type": "span",
                        "span_id": "s2",
                        "op": "http.client",
                        "expanded": false,
                        "children": [
                            { "type": "error", "event_id": "err1", "level": "error", "title": "Timeout" }
                        ]
                    },
                    { "type": "autogroup", "op": "db", "description": "INSERT", "group_count": 3 },
                    { "type": "missing_instrumentation", "duration_ms": 120 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_flatten_depth_first() {
        let tree = TraceTree::from_json_str(TRACE).unwrap();

        assert_eq!(tree.node_count(), 6);
        assert_eq!(tree.len(), 5);

        let kinds: Vec<_> = tree.list().iter().map(|n| n.value.kind()).collect();
        assert_eq!(
            kinds,
            vec!["transaction", "span", "span", "autogroup", "missing_instrumentation"]
        );

        let depths: Vec<_> = tree.list().iter().map(|n| n.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 1, 1]);
    }

    #[test]
    fn test_expand_collapsed_node() {
        let mut tree = TraceTree::from_json_str(TRACE).unwrap();
        let collapsed = tree.get(2).unwrap().id;

        assert!(tree.set_expanded(collapsed, true));
        assert_eq!(tree.len(), 6);
        assert_eq!(tree.get(3).unwrap().value.kind(), "error");
        assert_eq!(tree.get(3).unwrap().depth, 2);

        assert!(!tree.set_expanded(collapsed, true));
    }

    #[test]
    fn test_node_ids_survive_rebuild() {
        let mut tree = TraceTree::from_json_str(TRACE).unwrap();
        let autogroup = tree.get(3).unwrap().id;

        tree.expand_all();

        assert_eq!(tree.position_of(autogroup), Some(4));
    }

    #[test]
    fn test_labels() {
        let tree = TraceTree::from_json_str(TRACE).unwrap();

        assert_eq!(tree.get(0).unwrap().value.label(), "http.server - GET /api/users");
        assert_eq!(tree.get(3).unwrap().value.label(), "db - INSERT (3x)");
        assert_eq!(
            tree.get(4).unwrap().value.label(),
            "Missing instrumentation (120ms)"
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TraceTree::from_json_str("{\"nodes\": [{\"type\": \"bogus\"}]}"),
            Err(TracegrepError::Json(_))
        ));
    }
}
