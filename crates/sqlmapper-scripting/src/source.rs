//! SQL sources: from node tree to bound statement.

use crate::context::DynamicContext;
use crate::fragment::FragmentRegistry;
use crate::node::SqlNode;
use crate::tokens::parse_placeholders;
use sqlmapper_core::{BoundSql, ParameterBinding, Result, Value};
use std::sync::Arc;

/// Produces a bound, ready-to-parameterize statement for a runtime
/// parameter object.
///
/// Given the same parameter object, a source yields a [`BoundSql`] whose
/// binding order matches the positional markers in the final text left to
/// right.
pub trait SqlSource: Send + Sync {
    /// Resolve the statement against the given parameter object.
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql>;
}

/// Text and bindings fully resolved at build time.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    bindings: Vec<ParameterBinding>,
}

impl StaticSqlSource {
    /// Wrap already-positional text and its ordered bindings.
    pub fn new(sql: impl Into<String>, bindings: Vec<ParameterBinding>) -> Self {
        Self {
            sql: sql.into(),
            bindings,
        }
    }

    /// Parse `#{...}` placeholders out of statement text.
    pub fn parse(sql: &str) -> Result<Self> {
        let (sql, bindings) = parse_placeholders(sql)?;
        Ok(Self { sql, bindings })
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, _parameter: &Value) -> Result<BoundSql> {
        Ok(BoundSql::new(self.sql.clone(), self.bindings.clone()))
    }
}

/// Fast path for statements with no conditional fragments: the tree is
/// flattened once, at build time, independent of any parameter object.
#[derive(Debug, Clone)]
pub struct RawSqlSource {
    inner: StaticSqlSource,
}

impl RawSqlSource {
    /// Flatten a static node tree into a pre-resolved source.
    pub fn new(root: &SqlNode, fragments: Arc<FragmentRegistry>) -> Result<Self> {
        let mut ctx = DynamicContext::new(Value::Null, fragments);
        root.apply(&mut ctx)?;
        Ok(Self {
            inner: StaticSqlSource::parse(ctx.sql())?,
        })
    }

    /// Build from plain statement text.
    pub fn from_sql(sql: &str) -> Result<Self> {
        Ok(Self {
            inner: StaticSqlSource::parse(sql)?,
        })
    }
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql> {
        self.inner.bound_sql(parameter)
    }
}

/// Re-evaluates its tree per call with the live parameter object, then
/// substitutes placeholders into positional markers.
pub struct DynamicSqlSource {
    root: SqlNode,
    fragments: Arc<FragmentRegistry>,
}

impl DynamicSqlSource {
    /// Wrap a node tree for per-call evaluation.
    pub fn new(root: SqlNode, fragments: Arc<FragmentRegistry>) -> Self {
        Self { root, fragments }
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, parameter: &Value) -> Result<BoundSql> {
        let mut ctx = DynamicContext::new(parameter.clone(), Arc::clone(&self.fragments));
        self.root.apply(&mut ctx)?;
        let sql = ctx.sql().to_string();
        tracing::debug!(sql, "resolved dynamic statement");
        let (sql, bindings) = parse_placeholders(&sql)?;
        let mut bound = BoundSql::new(sql, bindings);
        for (name, value) in ctx.into_bindings() {
            bound.set_additional(name, value);
        }
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;
    use crate::node::Foreach;
    use sqlmapper_core::value::map;

    fn no_fragments() -> Arc<FragmentRegistry> {
        Arc::new(FragmentRegistry::new())
    }

    #[test]
    fn raw_source_resolves_once() {
        let root = SqlNode::text("SELECT * FROM users WHERE id = #{id}");
        let source = RawSqlSource::new(&root, no_fragments()).unwrap();

        let bound = source.bound_sql(&map([("id", Value::Int(1))])).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE id = ?");
        assert_eq!(bound.bindings().len(), 1);
        assert_eq!(bound.bindings()[0].property(), "id");
    }

    #[test]
    fn dynamic_source_reacts_to_parameters() {
        let root = SqlNode::mixed([
            SqlNode::text("SELECT * FROM users"),
            SqlNode::where_clause(SqlNode::mixed([
                SqlNode::if_then(
                    Expr::prop("id").is_not_null(),
                    SqlNode::text("AND id = #{id}"),
                ),
                SqlNode::if_then(
                    Expr::prop("name").is_not_null(),
                    SqlNode::text("AND name = #{name}"),
                ),
            ])),
        ]);
        let source = DynamicSqlSource::new(root, no_fragments());

        let bound = source
            .bound_sql(&map([("name", Value::from("Ada"))]))
            .unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE name = ?");
        assert_eq!(bound.bindings()[0].property(), "name");

        let bound = source.bound_sql(&Value::Null).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users");
        assert!(bound.bindings().is_empty());
    }

    #[test]
    fn binding_order_matches_markers() {
        let root = SqlNode::text("UPDATE users SET name = #{name}, age = #{age} WHERE id = #{id}");
        let source = DynamicSqlSource::new(root, no_fragments());
        let bound = source.bound_sql(&Value::Null).unwrap();

        let properties: Vec<_> = bound
            .bindings()
            .iter()
            .map(|b| b.property().to_string())
            .collect();
        assert_eq!(properties, ["name", "age", "id"]);
    }

    #[test]
    fn loop_entries_land_in_additional_bindings() {
        let root = SqlNode::mixed([
            SqlNode::text("SELECT * FROM users WHERE id IN"),
            SqlNode::Foreach(
                Foreach::new(Expr::prop("ids"), "id", SqlNode::text("#{id}"))
                    .open("(")
                    .close(")")
                    .separator(","),
            ),
        ]);
        let source = DynamicSqlSource::new(root, no_fragments());
        let parameter = map([(
            "ids",
            Value::Array(vec![Value::Int(7), Value::Int(8)]),
        )]);
        let bound = source.bound_sql(&parameter).unwrap();

        assert_eq!(
            bound.sql(),
            "SELECT * FROM users WHERE id IN ( ? , ? )"
        );
        assert_eq!(bound.bindings().len(), 2);
        // Each positional binding resolves through the side table, not the
        // parameter object.
        assert_eq!(
            bound.resolve_binding(&parameter, bound.bindings()[0].property()),
            Value::Int(7)
        );
        assert_eq!(
            bound.resolve_binding(&parameter, bound.bindings()[1].property()),
            Value::Int(8)
        );
    }

    #[test]
    fn same_parameter_gives_stable_output() {
        let root = SqlNode::mixed([
            SqlNode::text("SELECT * FROM t"),
            SqlNode::where_clause(SqlNode::if_then(
                Expr::prop("a").is_not_null(),
                SqlNode::text("AND a = #{a}"),
            )),
        ]);
        let source = DynamicSqlSource::new(root, no_fragments());
        let parameter = map([("a", Value::Int(1))]);

        let first = source.bound_sql(&parameter).unwrap();
        let second = source.bound_sql(&parameter).unwrap();
        assert_eq!(first.sql(), second.sql());
        assert_eq!(first.bindings(), second.bindings());
    }
}
