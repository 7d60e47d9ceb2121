//! Named fragment registry.
//!
//! Reusable subtrees are registered once under a name and inlined wherever
//! a [`SqlNode::FragmentRef`] appears. Reference cycles are rejected at
//! registration time, not discovered during evaluation.

use crate::node::SqlNode;
use sqlmapper_core::error::{Error, Result, ScriptError, ScriptErrorKind};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Registry of named, pre-registered subtrees.
#[derive(Debug, Default)]
pub struct FragmentRegistry {
    fragments: HashMap<String, Arc<SqlNode>>,
}

impl FragmentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fragment subtree under a name.
    ///
    /// Fails when the new subtree can reach itself through already
    /// registered fragments (including direct self-reference). References
    /// to fragments not registered yet are allowed here and fail at
    /// evaluation if still unresolved.
    pub fn register(&mut self, name: impl Into<String>, node: SqlNode) -> Result<()> {
        let name = name.into();
        let mut stack = collect_refs(&node);
        let mut seen = HashSet::new();
        while let Some(reference) = stack.pop() {
            if reference == name {
                return Err(Error::Script(ScriptError::new(
                    ScriptErrorKind::FragmentCycle,
                    format!("registering fragment '{name}' would create a reference cycle"),
                )));
            }
            if !seen.insert(reference.clone()) {
                continue;
            }
            if let Some(sub) = self.fragments.get(&reference) {
                stack.extend(collect_refs(sub));
            }
        }
        self.fragments.insert(name, Arc::new(node));
        Ok(())
    }

    /// Look up a fragment subtree.
    pub fn get(&self, name: &str) -> Option<Arc<SqlNode>> {
        self.fragments.get(name).cloned()
    }

    /// Number of registered fragments.
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Check if no fragments are registered.
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Collect the fragment names referenced anywhere in a subtree.
fn collect_refs(node: &SqlNode) -> Vec<String> {
    let mut refs = Vec::new();
    walk(node, &mut refs);
    refs
}

fn walk(node: &SqlNode, refs: &mut Vec<String>) {
    match node {
        SqlNode::Text { .. } | SqlNode::Bind { .. } => {}
        SqlNode::Mixed(children) => {
            for child in children {
                walk(child, refs);
            }
        }
        SqlNode::If { contents, .. } => walk(contents, refs),
        SqlNode::Choose { whens, otherwise } => {
            for (_, child) in whens {
                walk(child, refs);
            }
            if let Some(child) = otherwise {
                walk(child, refs);
            }
        }
        SqlNode::Foreach(spec) => walk(spec.contents(), refs),
        SqlNode::Trim(spec) => walk(spec.contents(), refs),
        SqlNode::FragmentRef { name } => refs.push(name.clone()),
    }
}
