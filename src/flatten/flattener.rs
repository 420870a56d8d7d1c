//! Depth-first flattener

use crate::document::{from_extended_json, DocValue, RawDocument, Scalar, ValueKind};
use crate::error::{Error, Result};
use crate::naming::{sanitize, NameRegistry};
use serde_json::{Map, Value};

/// Containers nested deeper than this are kept as one JSON string leaf
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// One leaf of a flattened document
#[derive(Debug, Clone, PartialEq)]
pub struct FlatField {
    /// Sanitized, document-unique column name
    pub name: String,
    /// Leaf value
    pub value: Scalar,
    /// Enclosing containers (sanitized name and kind), outermost first
    pub ancestors: Vec<(String, ValueKind)>,
}

impl FlatField {
    /// Source kind of the leaf value
    pub fn kind(&self) -> ValueKind {
        self.value.kind()
    }
}

/// A document flattened to a single level
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatDocument {
    /// Leaves in depth-first order
    pub fields: Vec<FlatField>,
    /// Every non-empty container walked through, with its kind
    pub containers: Vec<(String, ValueKind)>,
}

impl FlatDocument {
    /// Column names in depth-first order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Look up a leaf by column name
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Number of leaves
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document produced no leaves
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Render as a flat JSON object
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| {
                let value = match &f.value {
                    Scalar::Null => Value::Null,
                    Scalar::Bool(b) => Value::Bool(*b),
                    Scalar::Int(i) => Value::from(*i),
                    Scalar::Float(x) => serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number),
                    other => other.to_text().map_or(Value::Null, Value::String),
                };
                (f.name.clone(), value)
            })
            .collect();
        Value::Object(map)
    }
}

/// Flattens documents into [`FlatDocument`]s
#[derive(Debug, Clone)]
pub struct Flattener {
    max_depth: usize,
}

impl Default for Flattener {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Flattener {
    /// Create a flattener with the default depth limit
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the depth limit (at least 1)
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Decode a raw Extended JSON document and flatten it
    pub fn flatten_raw(&self, raw: &RawDocument) -> Result<FlatDocument> {
        self.flatten(from_extended_json(raw)?)
    }

    /// Flatten a document tree
    ///
    /// The root must be an object. Empty objects and sequences produce no
    /// field.
    pub fn flatten(&self, doc: DocValue) -> Result<FlatDocument> {
        let DocValue::Object(fields) = doc else {
            return Err(Error::document(format!(
                "cannot flatten a {} root",
                doc.kind()
            )));
        };

        let mut walk = Walk {
            max_depth: self.max_depth,
            registry: NameRegistry::new(),
            ancestors: Vec::new(),
            out: FlatDocument::default(),
        };
        for (key, value) in fields {
            walk.visit(key, value, 1);
        }
        Ok(walk.out)
    }
}

/// Flatten with the default settings
pub fn flatten(doc: DocValue) -> Result<FlatDocument> {
    Flattener::new().flatten(doc)
}

struct Walk {
    max_depth: usize,
    registry: NameRegistry,
    ancestors: Vec<(String, ValueKind)>,
    out: FlatDocument,
}

impl Walk {
    fn visit(&mut self, path: String, value: DocValue, depth: usize) {
        match value {
            DocValue::Object(fields) if fields.is_empty() => {}
            DocValue::Array(items) if items.is_empty() => {}
            container @ (DocValue::Object(_) | DocValue::Array(_)) if depth >= self.max_depth => {
                self.leaf(&path, container.into_scalar());
            }
            DocValue::Object(fields) => {
                self.enter(&path, ValueKind::Struct);
                for (key, child) in fields {
                    self.visit(format!("{path}.{key}"), child, depth + 1);
                }
                self.ancestors.pop();
            }
            DocValue::Array(items) => {
                self.enter(&path, ValueKind::Array);
                for (index, child) in items.into_iter().enumerate() {
                    self.visit(format!("{path}.{index}"), child, depth + 1);
                }
                self.ancestors.pop();
            }
            leaf => self.leaf(&path, leaf.into_scalar()),
        }
    }

    fn enter(&mut self, path: &str, kind: ValueKind) {
        let name = sanitize(path);
        self.out.containers.push((name.clone(), kind));
        self.ancestors.push((name, kind));
    }

    fn leaf(&mut self, path: &str, value: Scalar) {
        let name = self.registry.uniquify(&sanitize(path));
        self.out.fields.push(FlatField {
            name,
            value,
            ancestors: self.ancestors.clone(),
        });
    }
}
