use loro::{LoroDoc, LoroList, LoroMap, LoroText, ToJson};
use serde_json::Value;

use crate::models::{CanonicalDoc, CanonicalNode};

const MAX_DEPTH: usize = 100; // Prevent stack overflow

/// Build a LoroDoc from a canonical document.
///
/// The document root holds a movable list "content" with one LoroMap per
/// node. Text nodes store their text in a LoroText container so concurrent
/// edits merge at character level; attrs and marks become nested maps/lists.
pub fn canonical_to_loro(canonical: &CanonicalDoc) -> LoroDoc {
    let loro_doc = LoroDoc::new();

    let content_loro_list = loro_doc.get_movable_list("content");
    for (idx, node) in canonical.content.iter().enumerate() {
        let node_loro_map = node_to_loro_map(node, 0, MAX_DEPTH);
        let _ = content_loro_list.insert_container(idx, node_loro_map);
    }

    loro_doc.commit();
    loro_doc
}

/// Read the canonical document back out of a LoroDoc.
///
/// Goes through the deep-value JSON export; LoroText containers come back as
/// plain strings, which is exactly the canonical shape.
pub fn loro_to_canonical(loro_doc: &LoroDoc) -> Result<CanonicalDoc, String> {
    let deep_value = loro_doc.get_deep_value().to_json_value();

    let content = match deep_value.get("content") {
        Some(content) => content.clone(),
        None => return Ok(CanonicalDoc::empty()),
    };

    let doc_value = serde_json::json!({
        "type": "doc",
        "content": content,
    });

    serde_json::from_value(doc_value)
        .map_err(|e| format!("Failed to parse canonical document from CRDT state: {}", e))
}

fn node_to_loro_map(node: &CanonicalNode, depth: usize, max_depth: usize) -> LoroMap {
    let loro_map = LoroMap::new();

    // Prevent stack overflow by limiting recursion depth
    if depth >= max_depth {
        let _ = loro_map.insert("type", "truncated");
        return loro_map;
    }

    // Set the node type
    let _ = loro_map.insert("type", node.r#type.as_str());

    // Set the attrs
    if !node.attrs.is_empty() {
        let attrs_loro_map = loro_map
            .get_or_create_container("attrs", LoroMap::new())
            .unwrap();
        for (key, value) in &node.attrs {
            insert_json_value(&attrs_loro_map, key, value);
        }
    }

    // Set the text (a LoroText so edits merge per character)
    if let Some(text) = &node.text {
        let text_loro = loro_map
            .get_or_create_container("text", LoroText::new())
            .unwrap();
        let _ = text_loro.insert(0, text.as_str());
    }

    // Set the marks
    if !node.marks.is_empty() {
        let marks_loro_list = loro_map
            .get_or_create_container("marks", LoroList::new())
            .unwrap();
        for (idx, mark) in node.marks.iter().enumerate() {
            let mark_loro_map = LoroMap::new();
            let _ = mark_loro_map.insert("type", mark.r#type.as_str());
            if !mark.attrs.is_empty() {
                let mark_attrs_loro_map = mark_loro_map
                    .get_or_create_container("attrs", LoroMap::new())
                    .unwrap();
                for (key, value) in &mark.attrs {
                    insert_json_value(&mark_attrs_loro_map, key, value);
                }
            }
            let _ = marks_loro_list.insert_container(idx, mark_loro_map);
        }
    }

    // Set the child nodes
    if !node.content.is_empty() {
        let children_loro_list = loro_map
            .get_or_create_container("content", LoroList::new())
            .unwrap();
        for (idx, child) in node.content.iter().enumerate() {
            let child_loro_map = node_to_loro_map(child, depth + 1, max_depth);
            let _ = children_loro_list.insert_container(idx, child_loro_map);
        }
    }

    loro_map
}

fn insert_json_value(loro_map: &LoroMap, key: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => {
            let _ = loro_map.insert(key, *b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = loro_map.insert(key, i);
            } else if let Some(f) = n.as_f64() {
                let _ = loro_map.insert(key, f);
            }
        }
        Value::String(s) => {
            let _ = loro_map.insert(key, s.as_str());
        }
        // Nested attr values are rare; store them as serialized JSON.
        other => {
            let json = serde_json::to_string(other).unwrap_or_default();
            let _ = loro_map.insert(key, json.as_str());
        }
    }
}
