// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Flatten JSON documents into tabular records.
//!
//! Nested API responses are awkward to inspect directly. The flattener walks
//! a decoded JSON document and produces one [`FlatRecord`] per node visited,
//! where each record knows its immediate key, the exact path leading to it
//! from the document root, and a __generalized__ path where every array index
//! has been replaced by a wildcard. Generalized paths make it possible to
//! group structurally repeated elements, e.g., every `["tag_name"]` of every
//! release in a release listing shares the generalized path
//! `[*]["tag_name"]`.
//!
//! # Path Layout
//!
//! Paths are built from bracketed segments. Object fields are written as
//! quoted names `["field"]`, and array elements as plain indices `[3]`. Thus,
//! `["a"][3]["b"]` names field "b" of the fourth element of the array in
//! field "a". The generalized version of that path is `["a"][*]["b"]`.
//!
//! Field names containing a period are rejected outright. Downstream tooling
//! splits paths on periods, so a literal period inside a field name cannot be
//! told apart from a structural one.
//!
//! # Traversal Root
//!
//! What gets flattened is decided by a [`Selector`]. The default selector
//! `$..*` visits every node in the document except the root itself.

pub mod selector;

pub use selector::{Selector, SelectorError};

use serde::Serialize;
use serde_json::Value;
use std::{
    collections::VecDeque,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
};
use tracing::{debug, instrument};

/// Flatten every node of a JSON document.
///
/// Same as [`flatten_with`] using the default `$..*` selector.
///
/// # Errors
///
/// - Return [`FlattenError::MalformedKey`] if any field name contains a period.
pub fn flatten(document: &Value) -> Result<Vec<FlatRecord>> {
    flatten_with(document, &Selector::default())
}

/// Flatten JSON document starting from a traversal-root expression.
///
/// # Errors
///
/// - Return [`FlattenError::Selector`] if expression cannot be parsed.
/// - Return [`FlattenError::MalformedKey`] if any field name contains a period.
pub fn flatten_at(document: &Value, expr: impl AsRef<str>) -> Result<Vec<FlatRecord>> {
    let selector = expr.as_ref().parse::<Selector>()?;
    flatten_with(document, &selector)
}

/// Flatten nodes of JSON document matched by selector.
///
/// Matched nodes are flattened in document order. If the selector ends with
/// a descendant wildcard, then every descendant of each matched node is
/// visited depth-first instead of the matched node itself.
///
/// # Errors
///
/// - Return [`FlattenError::MalformedKey`] if any field name contains a period.
#[instrument(skip(document), level = "debug")]
pub fn flatten_with(document: &Value, selector: &Selector) -> Result<Vec<FlatRecord>> {
    let mut records = Vec::new();

    for (path, value) in selector.select(document) {
        if !selector.is_descendants() {
            records.push(FlatRecord::new(&path, value)?);
            continue;
        }

        // Use DFS to visit descendants in document order.
        let mut nodes = VecDeque::new();
        push_children(&mut nodes, &path, value);
        while let Some((path, value)) = nodes.pop_front() {
            records.push(FlatRecord::new(&path, value)?);
            push_children(&mut nodes, &path, value);
        }
    }

    debug!("flattened {} records", records.len());
    Ok(records)
}

/// Resolve exact path produced by the flattener against a document.
///
/// Returns `None` if the path does not parse, contains wildcards, or does not
/// lead anywhere in the document. An empty path resolves to the root.
pub fn lookup<'v>(document: &'v Value, full_path: impl AsRef<str>) -> Option<&'v Value> {
    let selector = format!("${}", full_path.as_ref()).parse::<Selector>().ok()?;
    if !selector.is_exact() {
        return None;
    }

    selector
        .select(document)
        .into_iter()
        .next()
        .map(|(_, value)| value)
}

fn push_children<'v>(
    nodes: &mut VecDeque<(Vec<Segment>, &'v Value)>,
    path: &[Segment],
    value: &'v Value,
) {
    // INVARIANT: Push in reverse so first child gets popped first.
    for (segment, child) in children(value).into_iter().rev() {
        let mut child_path = path.to_vec();
        child_path.push(segment);
        nodes.push_front((child_path, child));
    }
}

pub(crate) fn children(value: &Value) -> Vec<(Segment, &Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(name, child)| (Segment::Field(name.clone()), child))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, child)| (Segment::Index(index), child))
            .collect(),
        _ => Vec::new(),
    }
}

/// Flattened view of one JSON node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    /// Immediate path segment of node, e.g., `name` or `[3]`.
    pub key: String,

    /// Exact path from document root.
    pub full_path: String,

    /// Exact path with every array index replaced by `[*]`.
    pub full_path_generalized: String,

    /// Textual representation of node value.
    ///
    /// Strings are kept as is, containers are rendered as compact JSON.
    pub value: String,

    /// Kind of JSON value the node holds.
    pub kind: ValueKind,

    /// Textual value looks like a JSON object.
    pub is_object: bool,

    /// Textual value looks like a JSON array.
    pub is_array: bool,
}

impl FlatRecord {
    fn new(path: &[Segment], value: &Value) -> Result<Self> {
        // INVARIANT: No field name along the path may contain a period.
        if let Some(key) = path.iter().find_map(Segment::malformed_field) {
            return Err(FlattenError::MalformedKey {
                key: key.to_owned(),
                path: format_path(path, false),
            });
        }

        let key = match path.last() {
            Some(Segment::Field(name)) => name.clone(),
            Some(Segment::Index(index)) => format!("[{index}]"),
            None => "$".into(),
        };

        let value_text = match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let is_object = value_text.starts_with('{') && value_text.ends_with('}');
        let is_array = value_text.starts_with('[') && value_text.ends_with(']');

        Ok(Self {
            key,
            full_path: format_path(path, false),
            full_path_generalized: format_path(path, true),
            value: value_text,
            kind: ValueKind::from(value),
            is_object,
            is_array,
        })
    }
}

/// Single step in a path from the document root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// Object field name.
    Field(String),

    /// Array element index.
    Index(usize),
}

impl Segment {
    fn malformed_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) if name.contains('.') => Some(name.as_str()),
            _ => None,
        }
    }
}

impl Display for Segment {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Field(name) => {
                let quoted = serde_json::to_string(name).map_err(|_| FmtError)?;
                write!(fmt, "[{quoted}]")
            }
            Self::Index(index) => write!(fmt, "[{index}]"),
        }
    }
}

fn format_path(path: &[Segment], generalize: bool) -> String {
    path.iter()
        .map(|segment| match segment {
            Segment::Index(_) if generalize => "[*]".to_string(),
            segment => segment.to_string(),
        })
        .collect()
}

/// Kind of JSON value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl From<&Value> for ValueKind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let label = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        fmt.write_str(label)
    }
}

/// Flattening error types.
#[derive(Debug, thiserror::Error)]
pub enum FlattenError {
    /// Field name contains a period, so its path would be ambiguous.
    #[error("key {key:?} at {path} contains a '.' which makes its path ambiguous")]
    MalformedKey { key: String, path: String },

    /// Traversal-root expression cannot be parsed.
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

/// Friendly result alias :3
pub type Result<T, E = FlattenError> = std::result::Result<T, E>;
