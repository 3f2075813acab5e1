//! Structural diff of two `Value` trees
use super::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(Value),
    Removed(Value),
    Changed { old: Value, new: Value },
    Nested(Diff),
}

/// Changed keys only; unchanged keys are omitted
pub type Diff = BTreeMap<String, Change>;

/// Field by field diff of two maps. Anything that is not a map is compared whole under `"value"`.
pub fn diff_values(old: &Value, new: &Value) -> Diff {
    let mut diff = Diff::new();

    let (Value::Map(old_fields), Value::Map(new_fields)) = (old, new) else {
        if old != new {
            diff.insert("value".to_string(), changed(old, new));
        }
        return diff;
    };

    for (key, new_value) in new_fields {
        match old_fields.get(key) {
            None => {
                diff.insert(key.clone(), Change::Added(new_value.clone()));
            }
            Some(old_value) if old_value != new_value => {
                diff.insert(key.clone(), changed(old_value, new_value));
            }
            Some(_) => {}
        }
    }
    for (key, old_value) in old_fields {
        if !new_fields.contains_key(key) {
            diff.insert(key.clone(), Change::Removed(old_value.clone()));
        }
    }

    diff
}

/// Diff of two lists of maps, matching entries on the `key` field
pub fn diff_keyed(old: &[Value], new: &[Value], key: &str) -> Diff {
    let index = |values: &[Value]| -> BTreeMap<String, Value> {
        values
            .iter()
            .map(|value| (key_of(value, key), value.clone()))
            .collect()
    };
    let old = index(old);
    let new = index(new);

    diff_values(&Value::Map(old), &Value::Map(new))
}

fn changed(old: &Value, new: &Value) -> Change {
    match (old, new) {
        (Value::Map(_), Value::Map(_)) => Change::Nested(diff_values(old, new)),
        _ => Change::Changed {
            old: old.clone(),
            new: new.clone(),
        },
    }
}

fn key_of(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::Int(n)) => n.to_string(),
        Some(Value::Text(text)) => text.clone(),
        Some(other) => format!("{other:?}"),
        None => String::new(),
    }
}
