//! The dynamic SQL node tree.
//!
//! Statement text is a composite of fragment nodes. Each node appends its
//! contribution to the [`DynamicContext`] and reports whether it produced
//! output, which parent conditionals use to decide fall-through behavior.

use crate::context::DynamicContext;
use crate::expr::Expr;
use crate::tokens::{replace_dollar_tokens, rewrite_placeholder_roots};
use sqlmapper_core::error::{Error, Result, ScriptError, ScriptErrorKind};
use sqlmapper_core::Value;

/// One node of the dynamic SQL tree.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Literal text; `dynamic` text additionally substitutes `${...}`
    /// tokens against the context's variables at evaluation time
    Text { content: String, dynamic: bool },
    /// A sequence of child nodes applied in order
    Mixed(Vec<SqlNode>),
    /// Conditional branch: applies its child when the test holds
    If { test: Expr, contents: Box<SqlNode> },
    /// First-match conditional chain with an optional fallback
    Choose {
        whens: Vec<(Expr, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    /// Iteration over a collection-valued expression
    Foreach(Foreach),
    /// Prefix/suffix trimming around an isolated child evaluation
    Trim(Trim),
    /// Inlines a named, pre-registered subtree
    FragmentRef { name: String },
    /// Evaluates an expression and stores it under a name in the context
    Bind { name: String, value: Expr },
}

impl SqlNode {
    /// Literal text node. Text containing `${` tokens substitutes them at
    /// evaluation time.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        let dynamic = content.contains("${");
        SqlNode::Text { content, dynamic }
    }

    /// Sequence node.
    pub fn mixed(children: impl IntoIterator<Item = SqlNode>) -> Self {
        SqlNode::Mixed(children.into_iter().collect())
    }

    /// Conditional node.
    pub fn if_then(test: Expr, contents: SqlNode) -> Self {
        SqlNode::If {
            test,
            contents: Box::new(contents),
        }
    }

    /// First-match chain.
    pub fn choose(
        whens: impl IntoIterator<Item = (Expr, SqlNode)>,
        otherwise: Option<SqlNode>,
    ) -> Self {
        SqlNode::Choose {
            whens: whens.into_iter().collect(),
            otherwise: otherwise.map(Box::new),
        }
    }

    /// Reference to a registered fragment.
    pub fn fragment_ref(name: impl Into<String>) -> Self {
        SqlNode::FragmentRef { name: name.into() }
    }

    /// Variable binding node.
    pub fn bind(name: impl Into<String>, value: Expr) -> Self {
        SqlNode::Bind {
            name: name.into(),
            value,
        }
    }

    /// `WHERE` clause: prefixes non-empty content with `WHERE` and strips a
    /// leading `AND `/`OR `.
    pub fn where_clause(contents: SqlNode) -> Self {
        SqlNode::Trim(
            Trim::new(contents)
                .prefix("WHERE")
                .prefix_overrides(["AND ", "OR "]),
        )
    }

    /// `SET` clause: prefixes non-empty content with `SET` and strips a
    /// stray leading or trailing comma.
    pub fn set_clause(contents: SqlNode) -> Self {
        SqlNode::Trim(
            Trim::new(contents)
                .prefix("SET")
                .prefix_overrides([","])
                .suffix_overrides([","]),
        )
    }

    /// Apply this node, appending its output to the context.
    ///
    /// Returns whether the node produced output: a conditional whose test
    /// failed reports `false`, everything else `true`.
    pub fn apply(&self, ctx: &mut DynamicContext) -> Result<bool> {
        match self {
            SqlNode::Text { content, dynamic } => {
                if *dynamic {
                    let substituted = replace_dollar_tokens(content, |name| {
                        ctx.resolve(name).map(|value| value.to_string())
                    });
                    ctx.append_sql(&substituted);
                } else {
                    ctx.append_sql(content);
                }
                Ok(true)
            }
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }
            SqlNode::If { test, contents } => {
                if test.eval_bool(ctx)? {
                    contents.apply(ctx)?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            SqlNode::Choose { whens, otherwise } => {
                for (test, node) in whens {
                    if test.eval_bool(ctx)? {
                        node.apply(ctx)?;
                        return Ok(true);
                    }
                }
                if let Some(node) = otherwise {
                    node.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }
            SqlNode::Foreach(spec) => spec.apply(ctx),
            SqlNode::Trim(spec) => spec.apply(ctx),
            SqlNode::FragmentRef { name } => {
                let Some(node) = ctx.fragment(name) else {
                    return Err(Error::Script(ScriptError::new(
                        ScriptErrorKind::UnknownFragment,
                        format!("fragment '{name}' is not registered"),
                    )));
                };
                node.apply(ctx)
            }
            SqlNode::Bind { name, value } => {
                let value = value.eval(ctx)?;
                ctx.bind(name.clone(), value);
                Ok(true)
            }
        }
    }
}

/// Iteration node.
///
/// Re-applies its child once per element of the subject collection,
/// binding the item (and optional index) both under its plain name and a
/// synthetic, counter-suffixed name. Placeholders in the child's output
/// are rewritten to the synthetic names so repetitions never collide.
#[derive(Debug, Clone)]
pub struct Foreach {
    collection: Expr,
    item: String,
    index: Option<String>,
    open: Option<String>,
    close: Option<String>,
    separator: Option<String>,
    contents: Box<SqlNode>,
}

impl Foreach {
    /// Iterate `collection`, binding each element under `item`.
    pub fn new(collection: Expr, item: impl Into<String>, contents: SqlNode) -> Self {
        Self {
            collection,
            item: item.into(),
            index: None,
            open: None,
            close: None,
            separator: None,
            contents: Box::new(contents),
        }
    }

    /// Bind the element position under this name.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Text emitted before the first repetition.
    #[must_use]
    pub fn open(mut self, text: impl Into<String>) -> Self {
        self.open = Some(text.into());
        self
    }

    /// Text emitted after the last repetition.
    #[must_use]
    pub fn close(mut self, text: impl Into<String>) -> Self {
        self.close = Some(text.into());
        self
    }

    /// Text emitted between repetitions.
    #[must_use]
    pub fn separator(mut self, text: impl Into<String>) -> Self {
        self.separator = Some(text.into());
        self
    }

    /// The repeated child subtree.
    pub fn contents(&self) -> &SqlNode {
        &self.contents
    }

    fn items(&self, ctx: &DynamicContext) -> Result<Vec<Value>> {
        let subject = self.collection.eval(ctx)?;
        match subject {
            Value::Array(items) => Ok(items),
            Value::Json(json) => json
                .as_array()
                .map(|items| items.iter().cloned().map(Value::from).collect())
                .ok_or_else(|| not_iterable(&format!("JSON {json}"))),
            other => Err(not_iterable(other.type_name())),
        }
    }

    fn apply(&self, ctx: &mut DynamicContext) -> Result<bool> {
        let items = self.items(ctx)?;
        if let Some(open) = &self.open {
            ctx.append_sql(open);
        }
        for (position, item) in items.iter().enumerate() {
            let unique = ctx.next_unique();
            let item_key = format!("__frch_{}_{}", self.item, unique);
            ctx.bind(self.item.clone(), item.clone());
            ctx.bind(item_key.clone(), item.clone());

            let index_rewrite = self.index.as_ref().map(|index_name| {
                let index_key = format!("__frch_{index_name}_{unique}");
                let index_value = Value::BigInt(position as i64);
                ctx.bind(index_name.clone(), index_value.clone());
                ctx.bind(index_key.clone(), index_value);
                (index_name.clone(), index_key)
            });

            let (_, produced) = ctx.apply_isolated(&self.contents)?;
            let mut produced = rewrite_placeholder_roots(&produced, &self.item, &item_key);
            if let Some((from, to)) = index_rewrite {
                produced = rewrite_placeholder_roots(&produced, &from, &to);
            }

            if position > 0 {
                if let Some(separator) = &self.separator {
                    ctx.append_sql(separator);
                }
            }
            ctx.append_sql(produced.trim());
        }
        if let Some(close) = &self.close {
            ctx.append_sql(close);
        }
        Ok(true)
    }
}

fn not_iterable(what: &str) -> Error {
    Error::Script(ScriptError::new(
        ScriptErrorKind::NotIterable,
        format!("iteration subject evaluated to {what} instead of a collection"),
    ))
}

/// Trim node.
///
/// Evaluates its child into an isolated buffer; once the whole subtree has
/// run, strips the first matching prefix/suffix override from the trimmed
/// text, then wraps non-empty output in the configured prefix/suffix. Each
/// of prefix and suffix is applied exactly once per evaluation, no matter
/// how deeply trim nodes nest.
#[derive(Debug, Clone)]
pub struct Trim {
    contents: Box<SqlNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
}

impl Trim {
    /// Trim around the given child subtree.
    pub fn new(contents: SqlNode) -> Self {
        Self {
            contents: Box::new(contents),
            prefix: None,
            suffix: None,
            prefix_overrides: Vec::new(),
            suffix_overrides: Vec::new(),
        }
    }

    /// Prepend this prefix when the trimmed output is non-empty.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Append this suffix when the trimmed output is non-empty.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Tokens stripped (first match, once) from the start of the output.
    #[must_use]
    pub fn prefix_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_overrides = overrides.into_iter().map(Into::into).collect();
        self
    }

    /// Tokens stripped (first match, once) from the end of the output.
    #[must_use]
    pub fn suffix_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suffix_overrides = overrides.into_iter().map(Into::into).collect();
        self
    }

    /// The wrapped child subtree.
    pub fn contents(&self) -> &SqlNode {
        &self.contents
    }

    fn apply(&self, ctx: &mut DynamicContext) -> Result<bool> {
        let (result, produced) = ctx.apply_isolated(&self.contents)?;
        let mut text = produced.trim().to_string();

        if !text.is_empty() {
            let upper = text.to_uppercase();
            for token in &self.prefix_overrides {
                if upper.starts_with(&token.to_uppercase()) {
                    text.drain(..token.len());
                    text = text.trim_start().to_string();
                    break;
                }
            }
            let upper = text.to_uppercase();
            for token in &self.suffix_overrides {
                let token = token.trim_end();
                if upper.ends_with(&token.to_uppercase()) {
                    text.truncate(text.len() - token.len());
                    text = text.trim_end().to_string();
                    break;
                }
            }
        }

        if !text.is_empty() {
            if let Some(prefix) = &self.prefix {
                text.insert(0, ' ');
                text.insert_str(0, prefix);
            }
            if let Some(suffix) = &self.suffix {
                text.push(' ');
                text.push_str(suffix);
            }
            ctx.append_sql(&text);
        }
        Ok(result)
    }
}
