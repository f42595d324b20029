use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The canonical rich-document format: a typed tree of block and inline nodes
/// with formatting marks. This is the representation the document store
/// persists; the live CRDT form is derived from it at load time and converted
/// back at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDoc {
    #[serde(rename = "type", default = "doc_node_type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<CanonicalNode>,
}

fn doc_node_type() -> String {
    "doc".to_string()
}

impl CanonicalDoc {
    pub fn empty() -> Self {
        Self {
            r#type: doc_node_type(),
            content: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

impl Default for CanonicalDoc {
    fn default() -> Self {
        Self::empty()
    }
}

/// A node in the canonical tree. Block nodes (paragraph, heading, ...) carry
/// child nodes in `content`; inline text nodes carry `text` plus `marks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNode {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<CanonicalMark>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<CanonicalNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl CanonicalNode {
    pub fn block(node_type: &str, content: Vec<CanonicalNode>) -> Self {
        Self {
            r#type: node_type.to_string(),
            attrs: HashMap::new(),
            marks: Vec::new(),
            content,
            text: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            r#type: "text".to_string(),
            attrs: HashMap::new(),
            marks: Vec::new(),
            content: Vec::new(),
            text: Some(text.to_string()),
        }
    }
}

/// A formatting mark on an inline node (bold, italic, color, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMark {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, Value>,
}
