//! Document tree model shared by ground truth and predictions.
//!
//! [`Node`] is a closed tagged union over the container kinds the evaluator
//! understands. JSON input only ever produces objects, arrays and leaves;
//! [`Node::Set`] exists for callers that know a collection is unordered
//! (for example a list of tags) and want order-independent scoring.

use indexmap::IndexMap;
use serde_json::{Number, Value};
use std::cmp::Ordering;

/// A scalar value with no children.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    /// JSON `null`
    Null,
    /// JSON boolean
    Bool(bool),
    /// JSON number, kept in its original representation
    Number(Number),
    /// JSON string
    String(String),
}

impl Leaf {
    /// Natural string form used for text scoring.
    #[must_use = "returns the text form of the leaf"]
    pub fn text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::String(s) => s.clone(),
        }
    }

    /// Convert back into a JSON value.
    #[inline]
    #[must_use = "converts leaf to JSON"]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) => Value::String(s.clone()),
        }
    }

    const fn kind_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Number(_) => 2,
            Self::String(_) => 3,
        }
    }
}

/// A ground-truth or predicted document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Key/value mapping; key order is kept but carries no meaning
    Object(IndexMap<String, Node>),
    /// Ordered sequence
    Array(Vec<Node>),
    /// Unordered collection of unique members, stored in canonical order
    Set(Vec<Node>),
    /// Scalar value
    Leaf(Leaf),
}

impl Node {
    /// Build a set node. Duplicates are dropped and members are sorted
    /// canonically so that two sets with the same members are equal.
    #[must_use = "creates a set node"]
    pub fn set<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        let mut members: Vec<Self> = items.into_iter().collect();
        members.sort_by(canonical_cmp);
        members.dedup_by(|a, b| canonical_cmp(a, b) == Ordering::Equal);
        Self::Set(members)
    }

    /// Shorthand for a string leaf.
    #[inline]
    #[must_use = "creates a string leaf"]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Leaf(Leaf::String(value.into()))
    }

    /// Parse a JSON document into a node tree.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when `input` is not valid JSON.
    pub fn from_json_str(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<Value>(input).map(Self::from)
    }

    /// Convert back into a JSON value. Sets become arrays in canonical order.
    #[must_use = "converts node to JSON"]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Self::Array(items) | Self::Set(items) => {
                Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Leaf(leaf) => leaf.to_json(),
        }
    }

    /// Text used when this node is scored against a ground-truth leaf.
    ///
    /// Containers are rendered as compact JSON so scoring stays a uniform
    /// text comparison.
    #[must_use = "returns the scoring text of the node"]
    pub fn score_text(&self) -> String {
        match self {
            Self::Leaf(leaf) => leaf.text(),
            other => other.to_json().to_string(),
        }
    }

    /// `true` for `null`, the empty string and containers without members.
    #[inline]
    #[must_use = "checks whether the node is an empty value"]
    pub fn is_empty_value(&self) -> bool {
        match self {
            Self::Leaf(Leaf::Null) => true,
            Self::Leaf(Leaf::String(s)) => s.is_empty(),
            Self::Leaf(_) => false,
            Self::Object(map) => map.is_empty(),
            Self::Array(items) | Self::Set(items) => items.is_empty(),
        }
    }

    const fn kind_rank(&self) -> u8 {
        match self {
            Self::Leaf(leaf) => leaf.kind_rank(),
            Self::Array(_) => 4,
            Self::Set(_) => 5,
            Self::Object(_) => 6,
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Leaf(Leaf::Null),
            Value::Bool(b) => Self::Leaf(Leaf::Bool(b)),
            Value::Number(n) => Self::Leaf(Leaf::Number(n)),
            Value::String(s) => Self::Leaf(Leaf::String(s)),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Node {
    #[inline]
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

/// Deterministic total order used for set members.
///
/// Values of different kinds order by kind (null, bool, number, string,
/// array, set, object); numbers compare numerically, strings by code point,
/// containers by their compact JSON text.
#[must_use = "compares two nodes"]
pub fn canonical_cmp(a: &Node, b: &Node) -> Ordering {
    let by_kind = a.kind_rank().cmp(&b.kind_rank());
    if by_kind != Ordering::Equal {
        return by_kind;
    }

    match (a, b) {
        (Node::Leaf(Leaf::Bool(x)), Node::Leaf(Leaf::Bool(y))) => x.cmp(y),
        (Node::Leaf(Leaf::Number(x)), Node::Leaf(Leaf::Number(y))) => {
            let fx = x.as_f64().unwrap_or(f64::NAN);
            let fy = y.as_f64().unwrap_or(f64::NAN);
            fx.total_cmp(&fy)
                .then_with(|| x.to_string().cmp(&y.to_string()))
        }
        (Node::Leaf(Leaf::String(x)), Node::Leaf(Leaf::String(y))) => x.cmp(y),
        (Node::Leaf(Leaf::Null), Node::Leaf(Leaf::Null)) => Ordering::Equal,
        _ => a.to_json().to_string().cmp(&b.to_json().to_string()),
    }
}
