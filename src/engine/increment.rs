//! Update operators
//!
//! `$inc` adds to numeric fields and `$set` assigns fields. Both address
//! nested fields with dotted keys (`stats.views`) or nested maps.

use serde_json::{Map, Number, Value};

use super::errors::{EngineError, EngineResult};

/// Apply `$inc` to `target`
///
/// Nested maps are flattened to dotted paths. A numeric field is added to,
/// an absent field is set (intermediate objects are created), and a
/// non-numeric field or non-object intermediate is left as it is.
pub fn apply_increment(target: &mut Value, inc: &Map<String, Value>) {
    for (path, amount) in flatten(inc) {
        let Value::Number(amount) = amount else {
            continue;
        };
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        let Some(parent) = descend(target, parents) else {
            continue;
        };
        match parent.get_mut(*last) {
            None => {
                parent.insert(last.to_string(), Value::Number(amount));
            }
            Some(Value::Number(current)) => {
                if let Some(sum) = add(current, &amount) {
                    *current = sum;
                }
            }
            Some(_) => {}
        }
    }
}

/// Apply `$set` to `target`, creating intermediate objects
pub fn apply_set(target: &mut Value, set: &Map<String, Value>) {
    for (path, value) in set {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        if let Some(parent) = descend(target, parents) {
            parent.insert(last.to_string(), value.clone());
        }
    }
}

/// Split an update body into `$set` and `$inc` maps
///
/// A body without operators is a plain `$set`.
pub fn split_update(update: &Value) -> EngineResult<(Map<String, Value>, Map<String, Value>)> {
    let Value::Object(body) = update else {
        return Err(EngineError::validation("Update must be a JSON object"));
    };
    if !body.keys().any(|k| k.starts_with('$')) {
        return Ok((body.clone(), Map::new()));
    }

    let mut set = Map::new();
    let mut inc = Map::new();
    for (op, operand) in body {
        let target = match op.as_str() {
            "$set" => &mut set,
            "$inc" => &mut inc,
            other if other.starts_with('$') => {
                return Err(EngineError::validation(format!("Unsupported update operator '{}'", other)));
            }
            field => {
                return Err(EngineError::validation(format!(
                    "Cannot mix field '{}' with update operators",
                    field
                )));
            }
        };
        let Value::Object(fields) = operand else {
            return Err(EngineError::validation(format!("'{}' expects an object", op)));
        };
        target.extend(fields.clone());
    }
    if set.contains_key("_id") || inc.contains_key("_id") {
        return Err(EngineError::validation("_id cannot be updated"));
    }
    Ok((set, inc))
}

/// Nested maps to dotted paths; other values are leaves
fn flatten(map: &Map<String, Value>) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (key, value) in map {
        match value {
            Value::Object(nested) if !nested.is_empty() => {
                for (sub, leaf) in flatten(nested) {
                    out.push((format!("{}.{}", key, sub), leaf));
                }
            }
            leaf => out.push((key.clone(), leaf.clone())),
        }
    }
    out
}

/// Walk to the object holding the last segment, creating missing objects
///
/// None when an existing intermediate is not an object.
fn descend<'v>(target: &'v mut Value, parents: &[&str]) -> Option<&'v mut Map<String, Value>> {
    let mut current = target.as_object_mut()?;
    for segment in parents {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = slot.as_object_mut()?;
    }
    Some(current)
}

fn add(current: &Number, amount: &Number) -> Option<Number> {
    if let (Some(a), Some(b)) = (current.as_i64(), amount.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Some(Number::from(sum));
        }
    }
    if let (Some(a), Some(b)) = (current.as_u64(), amount.as_u64()) {
        if let Some(sum) = a.checked_add(b) {
            return Some(Number::from(sum));
        }
    }
    Number::from_f64(current.as_f64()? + amount.as_f64()?)
}
