//! Property-path access on [`Value`] trees.
//!
//! Statement arguments address parameter objects by dotted paths such as
//! `author.name` or `ids[2]`. This module is the narrow accessor the engine
//! uses for cache-key argument resolution, output-parameter copy-back, and
//! deferred-load assignment; there is no reflection behind it, only explicit
//! traversal of `Map`/`Array`/`Json` values.

use crate::error::{Error, Result, ScriptError, ScriptErrorKind};
use crate::value::Value;

/// One step of a parsed property path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Name(String),
    Index(usize),
}

fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            if open > 0 {
                segments.push(Segment::Name(rest[..open].to_string()));
            }
            match rest[open + 1..].find(']') {
                Some(close) => {
                    let idx = rest[open + 1..open + 1 + close].parse().unwrap_or(usize::MAX);
                    segments.push(Segment::Index(idx));
                    rest = &rest[open + close + 2..];
                }
                None => {
                    segments.push(Segment::Name(rest[open..].to_string()));
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(Segment::Name(rest.to_string()));
        }
    }
    segments
}

fn step(value: &Value, segment: &Segment) -> Option<Value> {
    match (value, segment) {
        (Value::Map(entries), Segment::Name(name)) => entries.get(name).cloned(),
        (Value::Array(items), Segment::Index(idx)) => items.get(*idx).cloned(),
        (Value::Json(json), Segment::Name(name)) => json.get(name).cloned().map(Value::from),
        (Value::Json(json), Segment::Index(idx)) => json.get(*idx).cloned().map(Value::from),
        _ => None,
    }
}

/// Split a property path into its root segment and the remainder.
///
/// `author.name` → `("author", "name")`, `ids[2]` → `("ids", "[2]")`,
/// `id` → `("id", "")`.
pub fn split_root(path: &str) -> (&str, &str) {
    match path.find(['.', '[']) {
        Some(pos) if path.as_bytes()[pos] == b'.' => (&path[..pos], &path[pos + 1..]),
        Some(pos) => (&path[..pos], &path[pos..]),
        None => (path, ""),
    }
}

/// Resolve a dotted property path against a value tree.
///
/// Returns `None` when any step of the path is missing or the shape does
/// not admit the step (e.g. indexing a scalar).
pub fn get_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value.clone();
    for segment in parse_path(path) {
        current = step(&current, &segment)?;
    }
    Some(current)
}

/// Set a dotted property path on a value tree, creating intermediate maps
/// for missing name segments.
///
/// Fails when an existing intermediate value cannot be traversed (indexing
/// out of bounds, or descending through a scalar).
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> Result<()> {
    let segments = parse_path(path);
    if segments.is_empty() {
        return Err(Error::Script(ScriptError::new(
            ScriptErrorKind::Property,
            "empty property path",
        )));
    }
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        let last = i == segments.len() - 1;
        match segment {
            Segment::Name(name) => {
                let entries = match current {
                    Value::Map(entries) => entries,
                    Value::Null => {
                        *current = Value::Map(Default::default());
                        match current {
                            Value::Map(entries) => entries,
                            _ => unreachable!(),
                        }
                    }
                    other => {
                        return Err(Error::Script(ScriptError::new(
                            ScriptErrorKind::Property,
                            format!(
                                "cannot set '{path}': segment '{name}' reached a {} value",
                                other.type_name()
                            ),
                        )));
                    }
                };
                if last {
                    entries.insert(name.clone(), new_value);
                    return Ok(());
                }
                current = entries.entry(name.clone()).or_insert(Value::Null);
            }
            Segment::Index(idx) => {
                let items = match current {
                    Value::Array(items) => items,
                    other => {
                        return Err(Error::Script(ScriptError::new(
                            ScriptErrorKind::Property,
                            format!(
                                "cannot set '{path}': index [{idx}] reached a {} value",
                                other.type_name()
                            ),
                        )));
                    }
                };
                let slot = items.get_mut(*idx).ok_or_else(|| {
                    Error::Script(ScriptError::new(
                        ScriptErrorKind::Property,
                        format!("cannot set '{path}': index [{idx}] out of bounds"),
                    ))
                })?;
                if last {
                    *slot = new_value;
                    return Ok(());
                }
                current = slot;
            }
        }
    }
    Ok(())
}
