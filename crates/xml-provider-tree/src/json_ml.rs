//! JsonML views of a [`Tree`]: snapshots and a builder for detached
//! subtrees.
//!
//! JsonML represents markup as nested JSON arrays:
//! `[tag, attrs?, ...children]` where `attrs` is an optional key→value map
//! and children are strings (text) or nested arrays (elements). A document
//! is rendered as a fragment with the empty tag `""`.
//!
//! These views exist for diagnostics and fixtures; they are not a storage
//! format.

use serde_json::{Map, Value};

use crate::{NodeId, NodeKind, Tree, TreeError};

/// Tag of a JsonML element.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Named(String),
    /// Empty string: a document, rendered without a wrapper element.
    Fragment,
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Named(s) => s,
            Tag::Fragment => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonMlNode {
    Text(String),
    Element(JsonMlElement),
}

/// Attributes keep document order.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonMlElement {
    pub tag: Tag,
    pub attrs: Option<Vec<(String, String)>>,
    pub children: Vec<JsonMlNode>,
}

// ── Snapshots ──────────────────────────────────────────────────────────────

impl Tree {
    /// Snapshot of a document or element subtree. Attributes have no
    /// standalone JsonML form and yield `None`.
    pub fn to_json_ml(&self, id: NodeId) -> Option<JsonMlNode> {
        let tag = match self.kind(id)? {
            NodeKind::Attribute => return None,
            NodeKind::Document => Tag::Fragment,
            NodeKind::Element => Tag::Named(self.name(id)?),
        };
        let attrs: Vec<(String, String)> = self
            .attributes(id)
            .into_iter()
            .filter_map(|attr| Some((self.name(attr)?, self.text(attr)?)))
            .collect();
        let mut children = Vec::new();
        if let Some(text) = self.text(id) {
            children.push(JsonMlNode::Text(text));
        }
        children.extend(
            self.children(id)
                .into_iter()
                .filter_map(|child| self.to_json_ml(child)),
        );
        Some(JsonMlNode::Element(JsonMlElement {
            tag,
            attrs: (!attrs.is_empty()).then_some(attrs),
            children,
        }))
    }

    /// JSON rendering of [`Tree::to_json_ml`]; an attribute renders as a
    /// single-entry object.
    pub fn to_json(&self, id: NodeId) -> Option<Value> {
        if self.kind(id)? == NodeKind::Attribute {
            let mut map = Map::new();
            map.insert(self.name(id)?, Value::String(self.text(id)?));
            return Some(Value::Object(map));
        }
        self.to_json_ml(id).map(|node| json_ml_to_value(&node))
    }

    /// Builds a detached subtree from JsonML. The empty tag creates a
    /// document. Scalar attribute values are stringified.
    pub fn build_json(&self, value: &Value) -> Result<NodeId, TreeError> {
        let items = value
            .as_array()
            .ok_or_else(|| TreeError::InvalidJsonMl(format!("expected array, got {value}")))?;
        let (tag, mut rest) = items
            .split_first()
            .ok_or_else(|| TreeError::InvalidJsonMl("empty element".to_owned()))?;
        let tag = tag
            .as_str()
            .ok_or_else(|| TreeError::InvalidJsonMl(format!("tag must be a string, got {tag}")))?;
        let node = if tag.is_empty() {
            self.create_document()
        } else {
            self.create_element(tag)?
        };
        if let Some(Value::Object(attrs)) = rest.first() {
            for (name, value) in attrs {
                self.set_attribute(node, name, &scalar_to_string(value)?)?;
            }
            rest = &rest[1..];
        }
        let mut text: Option<String> = None;
        for item in rest {
            match item {
                Value::String(s) => text.get_or_insert_with(String::new).push_str(s),
                Value::Array(_) => {
                    let child = self.build_json(item)?;
                    self.append_child(node, child)?;
                }
                other => {
                    return Err(TreeError::InvalidJsonMl(format!(
                        "unexpected child {other}"
                    )))
                }
            }
        }
        if let Some(text) = text {
            self.set_text(node, &text)?;
        }
        Ok(node)
    }
}

fn scalar_to_string(value: &Value) -> Result<String, TreeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(TreeError::InvalidJsonMl(format!(
            "attribute values must be scalars, got {other}"
        ))),
    }
}

pub fn json_ml_to_value(node: &JsonMlNode) -> Value {
    match node {
        JsonMlNode::Text(s) => Value::String(s.clone()),
        JsonMlNode::Element(el) => {
            let mut out = vec![Value::String(el.tag.as_str().to_owned())];
            if let Some(attrs) = &el.attrs {
                let map: Map<String, Value> = attrs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                out.push(Value::Object(map));
            }
            out.extend(el.children.iter().map(json_ml_to_value));
            Value::Array(out)
        }
    }
}
