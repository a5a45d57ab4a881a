//! Path compiler
//!
//! Decomposes documents into `(path, node)` pairs and compiles filters into
//! `path → selector` conjunction maps. The engine only sees the
//! `PathCompiler` trait; `JsonTreeCompiler` is the shipped implementation.

use serde_json::{Map, Value};

use super::errors::{TreeError, TreeResult};
use super::node::{IndexNode, NodeValue};
use super::path::{TreePath, IDENTITY_FIELD};
use super::selector::{insert_selector, CompiledFilter, ConjunctionMap, ExpressionSelector, Selector};
use crate::store::SortOrder;

/// Receives the nodes produced by a decomposition
pub trait NodeSink {
    /// Called once per produced node
    fn on_node(&mut self, path: TreePath, node: IndexNode);

    /// Canonical id of the document being decomposed
    fn id_for(&self) -> String;
}

/// Sink that keeps every node in production order
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    document_id: String,
    nodes: Vec<(TreePath, IndexNode)>,
}

impl CollectingSink {
    /// Sink labelling writes with `document_id`
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            nodes: Vec::new(),
        }
    }

    /// Produced nodes
    pub fn into_nodes(self) -> Vec<(TreePath, IndexNode)> {
        self.nodes
    }
}

impl NodeSink for CollectingSink {
    fn on_node(&mut self, path: TreePath, node: IndexNode) {
        self.nodes.push((path, node));
    }

    fn id_for(&self) -> String {
        self.document_id.clone()
    }
}

/// Object → tree decomposition and filter compilation
pub trait PathCompiler: Send + Sync {
    /// Feed every node of `document` to `sink`
    fn decompose(&self, document: &Value, domain: &str, sink: &mut dyn NodeSink);

    /// Compile a filter into conjunction map(s)
    fn compile(&self, domain: &str, filter: &Value) -> TreeResult<CompiledFilter>;
}

/// Default compiler over plain JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTreeCompiler;

impl JsonTreeCompiler {
    /// Create a compiler
    pub fn new() -> Self {
        Self
    }

    fn walk(&self, value: &Value, path: &TreePath, sink: &mut dyn NodeSink) {
        match value {
            Value::Object(map) => {
                for (field, child) in map {
                    self.walk(child, &path.child(field), sink);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item, path, sink);
                }
            }
            scalar => {
                let id = sink.id_for();
                sink.on_node(path.clone(), IndexNode::new(scalar.clone(), NodeValue::owned_by(&id)));
            }
        }
    }

    fn compile_object(
        &self,
        base: &TreePath,
        filter: &Map<String, Value>,
        top_level: bool,
    ) -> TreeResult<Vec<ConjunctionMap>> {
        let mut result = vec![ConjunctionMap::new()];

        for (key, value) in filter {
            match key.as_str() {
                "$or" => {
                    let branches = as_filter_list(key, value)?;
                    let mut alternatives = Vec::new();
                    for branch in branches {
                        alternatives.extend(self.compile_object(base, branch, top_level)?);
                    }
                    result = cross(result, alternatives);
                }
                "$and" => {
                    for branch in as_filter_list(key, value)? {
                        let compiled = self.compile_object(base, branch, top_level)?;
                        result = cross(result, compiled);
                    }
                }
                op if op.starts_with('$') => {
                    return Err(TreeError::invalid_filter(format!(
                        "operator '{}' is not valid at this position",
                        op
                    )));
                }
                field if top_level && field == IDENTITY_FIELD => {
                    let compiled = self.compile_field(&base.child(IDENTITY_FIELD), &identity_operand(value))?;
                    result = cross(result, compiled);
                }
                field => {
                    let compiled = self.compile_field(&base.child(field), value)?;
                    result = cross(result, compiled);
                }
            }
        }

        Ok(result)
    }

    fn compile_field(&self, path: &TreePath, value: &Value) -> TreeResult<Vec<ConjunctionMap>> {
        match value {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => {
                if map.keys().any(|k| !k.starts_with('$')) {
                    return Err(TreeError::invalid_filter(format!(
                        "cannot mix operators and fields under '{}'",
                        path
                    )));
                }
                let mut conjunction = ConjunctionMap::new();
                conjunction.insert(path.clone(), operator_selector(path, map)?);
                Ok(vec![conjunction])
            }
            Value::Object(map) if map.is_empty() => Err(TreeError::invalid_filter(format!(
                "empty object under '{}'",
                path
            ))),
            Value::Object(map) => self.compile_object(path, map, false),
            Value::Array(_) => Err(TreeError::invalid_filter(format!(
                "array literal under '{}'; use $in",
                path
            ))),
            scalar => {
                let mut conjunction = ConjunctionMap::new();
                conjunction.insert(path.clone(), Selector::Literal(scalar.clone()));
                Ok(vec![conjunction])
            }
        }
    }
}

impl PathCompiler for JsonTreeCompiler {
    fn decompose(&self, document: &Value, domain: &str, sink: &mut dyn NodeSink) {
        let id = sink.id_for();
        sink.on_node(TreePath::identity(domain), IndexNode::identity(&id));

        let root = TreePath::root(domain);
        if let Value::Object(map) = document {
            for (field, value) in map {
                if field == IDENTITY_FIELD {
                    continue;
                }
                self.walk(value, &root.child(field), sink);
            }
        }
    }

    fn compile(&self, domain: &str, filter: &Value) -> TreeResult<CompiledFilter> {
        let maps = match filter {
            Value::Null => vec![ConjunctionMap::new()],
            Value::Object(map) => self.compile_object(&TreePath::root(domain), map, true)?,
            _ => return Err(TreeError::invalid_filter("filter must be an object")),
        };
        Ok(CompiledFilter::from_maps(maps))
    }
}

/// Stored ids are strings; numeric id operands are matched in string form
fn identity_operand(value: &Value) -> Value {
    match value {
        Value::Object(ops) => Value::Object(
            ops.iter()
                .map(|(op, operand)| match op.as_str() {
                    "$eq" | "$ne" | "$in" | "$nin" => (op.clone(), identity_operand(operand)),
                    _ => (op.clone(), operand.clone()),
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(identity_operand).collect()),
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}

fn as_filter_list<'a>(op: &str, value: &'a Value) -> TreeResult<Vec<&'a Map<String, Value>>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| TreeError::invalid_filter(format!("'{}' expects a non-empty array", op)))?;
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| TreeError::invalid_filter(format!("'{}' items must be objects", op)))
        })
        .collect()
}

/// Every combination of one map from `left` and one from `right`
fn cross(left: Vec<ConjunctionMap>, right: Vec<ConjunctionMap>) -> Vec<ConjunctionMap> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in &left {
        for r in &right {
            let mut merged = l.clone();
            for (path, selector) in r {
                insert_selector(&mut merged, path.clone(), selector.clone());
            }
            out.push(merged);
        }
    }
    out
}

fn operator_selector(path: &TreePath, ops: &Map<String, Value>) -> TreeResult<Selector> {
    let mut clauses: Vec<String> = Vec::new();
    let mut selector = ExpressionSelector::new("");
    let mut literal: Option<Value> = None;

    for (op, operand) in ops {
        match op.as_str() {
            "$eq" => {
                scalar_operand(path, op, operand)?;
                literal = Some(operand.clone());
                clauses.push(format!("it == {}", operand));
            }
            "$ne" => clauses.push(format!("it != {}", scalar_operand(path, op, operand)?)),
            "$gt" => clauses.push(format!("it > {}", scalar_operand(path, op, operand)?)),
            "$gte" => clauses.push(format!("it >= {}", scalar_operand(path, op, operand)?)),
            "$lt" => clauses.push(format!("it < {}", scalar_operand(path, op, operand)?)),
            "$lte" => clauses.push(format!("it <= {}", scalar_operand(path, op, operand)?)),
            "$in" | "$nin" => {
                let items = operand.as_array().ok_or_else(|| {
                    TreeError::invalid_filter(format!("'{}' under '{}' expects an array", op, path))
                })?;
                for item in items {
                    scalar_operand(path, op, item)?;
                }
                let clause = if op == "$in" {
                    if items.is_empty() {
                        "false".to_string()
                    } else {
                        join(items.iter().map(|v| format!("it == {}", v)), " || ")
                    }
                } else if items.is_empty() {
                    "true".to_string()
                } else {
                    join(items.iter().map(|v| format!("it != {}", v)), " && ")
                };
                clauses.push(clause);
            }
            "$exists" => match operand {
                Value::Bool(true) => clauses.push("true".to_string()),
                _ => {
                    return Err(TreeError::invalid_filter(format!(
                        "'$exists' under '{}' only supports true",
                        path
                    )))
                }
            },
            "$regex" => {
                let pattern = operand.as_str().ok_or_else(|| {
                    TreeError::invalid_filter(format!("'$regex' under '{}' expects a string", path))
                })?;
                clauses.push(format!("it ~ {}", Value::String(pattern.to_string())));
            }
            "$fn" | "$expr" => {
                let body = operand.as_str().ok_or_else(|| {
                    TreeError::invalid_filter(format!("'{}' under '{}' expects a string", op, path))
                })?;
                clauses.push(body.to_string());
            }
            "$orderBy" => selector.order_by = Some(sort_operand(path, operand)?),
            "$limit" => selector.limit = Some(count_operand(path, op, operand)?),
            "$skip" => selector.skip = Some(count_operand(path, op, operand)?),
            other => {
                return Err(TreeError::invalid_filter(format!(
                    "unknown operator '{}' under '{}'",
                    other, path
                )))
            }
        }
    }

    if clauses.len() == 1 && !selector.has_directives() {
        if let Some(value) = literal {
            return Ok(Selector::Literal(value));
        }
    }

    selector.body = if clauses.is_empty() {
        "true".to_string()
    } else {
        join(clauses.iter().map(|c| format!("({})", c)), " && ")
    };
    selector.predicate()?;
    Ok(Selector::Expression(selector))
}

fn join(parts: impl Iterator<Item = String>, sep: &str) -> String {
    parts.collect::<Vec<_>>().join(sep)
}

fn scalar_operand<'a>(path: &TreePath, op: &str, operand: &'a Value) -> TreeResult<&'a Value> {
    match operand {
        Value::Array(_) | Value::Object(_) => Err(TreeError::invalid_filter(format!(
            "'{}' under '{}' expects a scalar",
            op, path
        ))),
        scalar => Ok(scalar),
    }
}

fn sort_operand(path: &TreePath, operand: &Value) -> TreeResult<SortOrder> {
    match operand {
        Value::String(s) if s.eq_ignore_ascii_case("asc") => Ok(SortOrder::Ascending),
        Value::String(s) if s.eq_ignore_ascii_case("desc") => Ok(SortOrder::Descending),
        Value::Number(n) if n.as_i64() == Some(1) => Ok(SortOrder::Ascending),
        Value::Number(n) if n.as_i64() == Some(-1) => Ok(SortOrder::Descending),
        _ => Err(TreeError::invalid_filter(format!(
            "'$orderBy' under '{}' expects 1, -1, \"asc\" or \"desc\"",
            path
        ))),
    }
}

fn count_operand(path: &TreePath, op: &str, operand: &Value) -> TreeResult<usize> {
    operand
        .as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| {
            TreeError::invalid_filter(format!("'{}' under '{}' expects a non-negative integer", op, path))
        })
}
