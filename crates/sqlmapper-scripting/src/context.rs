//! Evaluation state for one dynamic SQL build.

use crate::fragment::FragmentRegistry;
use crate::node::SqlNode;
use sqlmapper_core::property::{get_path, split_root};
use sqlmapper_core::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Binding name under which the whole parameter object is reachable.
pub const PARAMETER_KEY: &str = "_parameter";

/// Mutable accumulator used only while a node tree evaluates.
///
/// One context exists per bound-statement build and is discarded after:
/// the growing SQL text, the binding map seeded from the parameter object,
/// and the monotonic counter behind synthetic loop-variable names all live
/// here.
pub struct DynamicContext {
    sql: String,
    bindings: HashMap<String, Value>,
    unique_number: usize,
    fragments: Arc<FragmentRegistry>,
}

impl DynamicContext {
    /// Create a context seeded with the parameter object.
    pub fn new(parameter: Value, fragments: Arc<FragmentRegistry>) -> Self {
        let mut bindings = HashMap::new();
        bindings.insert(PARAMETER_KEY.to_string(), parameter);
        Self {
            sql: String::new(),
            bindings,
            unique_number: 0,
            fragments,
        }
    }

    /// Append one SQL fragment; fragments are joined by single spaces.
    pub fn append_sql(&mut self, part: &str) {
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(part);
    }

    /// The accumulated SQL text so far, outer whitespace trimmed.
    pub fn sql(&self) -> &str {
        self.sql.trim()
    }

    /// Store a named binding for later reference by sibling nodes.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Next value of the synthetic-name counter.
    ///
    /// Needed when the same source expression appears multiple times, e.g.
    /// inside a repeated loop fragment.
    pub fn next_unique(&mut self) -> usize {
        let n = self.unique_number;
        self.unique_number += 1;
        n
    }

    /// The parameter object this context was seeded with.
    pub fn parameter(&self) -> &Value {
        &self.bindings[PARAMETER_KEY]
    }

    /// Look up a registered fragment subtree.
    pub fn fragment(&self, name: &str) -> Option<Arc<SqlNode>> {
        self.fragments.get(name)
    }

    /// Resolve a property path: named bindings first (exact name, then by
    /// root segment), then the parameter object's properties.
    pub fn resolve(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(path) {
            return Some(value.clone());
        }
        let (root, rest) = split_root(path);
        if let Some(base) = self.bindings.get(root) {
            if rest.is_empty() {
                return Some(base.clone());
            }
            return get_path(base, rest);
        }
        let parameter = self.parameter();
        if parameter.is_null() {
            return None;
        }
        get_path(parameter, path)
    }

    /// Drain the binding map, parameter object included.
    ///
    /// Bound-statement construction copies these into the additional-
    /// bindings side table so positional resolution can see loop-generated
    /// entries.
    pub fn into_bindings(self) -> HashMap<String, Value> {
        self.bindings
    }

    /// Evaluate a node into an isolated buffer, leaving the accumulated
    /// SQL untouched. Returns the node's result flag and the produced text.
    pub fn apply_isolated(&mut self, node: &SqlNode) -> sqlmapper_core::Result<(bool, String)> {
        let saved = std::mem::take(&mut self.sql);
        let applied = node.apply(self);
        let produced = std::mem::replace(&mut self.sql, saved);
        Ok((applied?, produced))
    }
}
