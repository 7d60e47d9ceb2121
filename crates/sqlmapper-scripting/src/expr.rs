//! Condition expressions for dynamic SQL nodes.
//!
//! Tests on `if`/`choose` branches and the subjects of `foreach` loops are
//! structured expression trees built with the fluent constructors below and
//! evaluated against the context's bindings plus the parameter object.

use crate::context::DynamicContext;
use sqlmapper_core::error::{Error, Result, ScriptError, ScriptErrorKind};
use sqlmapper_core::Value;

/// Comparison and logic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    IsNull,
    NotNull,
    IsEmpty,
    NotEmpty,
}

/// A condition expression.
///
/// # Example
///
/// ```
/// use sqlmapper_scripting::Expr;
///
/// let test = Expr::prop("name").is_not_null().and(
///     Expr::prop("age").gt(Expr::lit(18)),
/// );
/// let _ = test;
/// ```
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value
    Lit(Value),
    /// Property path resolved against bindings, then the parameter object
    Prop(String),
    /// Unary operation
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Literal expression.
    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Lit(value.into())
    }

    /// Property-path expression.
    pub fn prop(path: impl Into<String>) -> Self {
        Expr::Prop(path.into())
    }

    fn binary(self, op: BinaryOp, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(self), Box::new(rhs))
    }

    /// `self == rhs`
    pub fn eq(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Eq, rhs)
    }

    /// `self != rhs`
    pub fn ne(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ne, rhs)
    }

    /// `self < rhs`
    pub fn lt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Lt, rhs)
    }

    /// `self <= rhs`
    pub fn le(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Le, rhs)
    }

    /// `self > rhs`
    pub fn gt(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Gt, rhs)
    }

    /// `self >= rhs`
    pub fn ge(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Ge, rhs)
    }

    /// Logical conjunction (short-circuiting).
    pub fn and(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::And, rhs)
    }

    /// Logical disjunction (short-circuiting).
    pub fn or(self, rhs: Expr) -> Self {
        self.binary(BinaryOp::Or, rhs)
    }

    /// Logical negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }

    /// `self IS NULL`
    pub fn is_null(self) -> Self {
        Expr::Unary(UnaryOp::IsNull, Box::new(self))
    }

    /// `self IS NOT NULL`
    pub fn is_not_null(self) -> Self {
        Expr::Unary(UnaryOp::NotNull, Box::new(self))
    }

    /// Container emptiness test.
    pub fn is_empty(self) -> Self {
        Expr::Unary(UnaryOp::IsEmpty, Box::new(self))
    }

    /// Container non-emptiness test.
    pub fn not_empty(self) -> Self {
        Expr::Unary(UnaryOp::NotEmpty, Box::new(self))
    }

    /// Evaluate to a value. Unresolvable properties evaluate to null.
    pub fn eval(&self, ctx: &DynamicContext) -> Result<Value> {
        match self {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Prop(path) => Ok(ctx.resolve(path).unwrap_or(Value::Null)),
            Expr::Unary(op, inner) => {
                let value = inner.eval(ctx)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value, "operand of 'not'")?)),
                    UnaryOp::IsNull => Ok(Value::Bool(value.is_null())),
                    UnaryOp::NotNull => Ok(Value::Bool(!value.is_null())),
                    UnaryOp::IsEmpty => Ok(Value::Bool(emptiness(&value)?)),
                    UnaryOp::NotEmpty => Ok(Value::Bool(!emptiness(&value)?)),
                }
            }
            Expr::Binary(op, lhs, rhs) => match op {
                BinaryOp::And => {
                    if !truthy(&lhs.eval(ctx)?, "left operand of 'and'")? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(truthy(&rhs.eval(ctx)?, "right operand of 'and'")?))
                }
                BinaryOp::Or => {
                    if truthy(&lhs.eval(ctx)?, "left operand of 'or'")? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(truthy(&rhs.eval(ctx)?, "right operand of 'or'")?))
                }
                _ => compare(*op, &lhs.eval(ctx)?, &rhs.eval(ctx)?),
            },
        }
    }

    /// Evaluate as a boolean test.
    ///
    /// Null evaluates false; anything other than a boolean or null is a
    /// configuration error reported at first evaluation.
    pub fn eval_bool(&self, ctx: &DynamicContext) -> Result<bool> {
        truthy(&self.eval(ctx)?, "test expression")
    }
}

fn truthy(value: &Value, what: &str) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(Error::Script(ScriptError::new(
            ScriptErrorKind::NotBoolean,
            format!("{what} evaluated to {} instead of a boolean", other.type_name()),
        ))),
    }
}

fn emptiness(value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(true),
        other => other.is_empty().ok_or_else(|| {
            Error::Script(ScriptError::new(
                ScriptErrorKind::NotIterable,
                format!("emptiness test applied to a {} value", other.type_name()),
            ))
        }),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    use std::cmp::Ordering;

    let ordering = if let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) {
        a.partial_cmp(&b)
    } else if let (Some(a), Some(b)) = (lhs.as_str(), rhs.as_str()) {
        Some(a.cmp(b))
    } else {
        None
    };

    let result = match (op, ordering) {
        (BinaryOp::Eq, Some(ord)) => ord == Ordering::Equal,
        (BinaryOp::Ne, Some(ord)) => ord != Ordering::Equal,
        (BinaryOp::Eq, None) => lhs.key_eq(rhs),
        (BinaryOp::Ne, None) => !lhs.key_eq(rhs),
        (BinaryOp::Lt, Some(ord)) => ord == Ordering::Less,
        (BinaryOp::Le, Some(ord)) => ord != Ordering::Greater,
        (BinaryOp::Gt, Some(ord)) => ord == Ordering::Greater,
        (BinaryOp::Ge, Some(ord)) => ord != Ordering::Less,
        (_, None) => {
            return Err(Error::Script(ScriptError::new(
                ScriptErrorKind::NotBoolean,
                format!(
                    "cannot order {} against {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
            )));
        }
        (BinaryOp::And | BinaryOp::Or, _) => unreachable!("handled by eval"),
    };
    Ok(Value::Bool(result))
}
