//! Dynamic SQL composition for SqlMapper Rust.
//!
//! `sqlmapper-scripting` is the **statement construction layer**. It turns
//! a tree of conditional fragments plus a runtime parameter object into
//! final parameterized SQL:
//!
//! - [`SqlNode`] — the fragment composite (text, conditionals, iteration,
//!   trimming, fragment references, variable binding)
//! - [`Expr`] — structured condition expressions over the parameter object
//! - [`DynamicContext`] — per-build evaluation state
//! - [`FragmentRegistry`] — named subtrees with registration-time cycle
//!   detection
//! - [`SqlSource`] — static/raw/dynamic sources yielding a `BoundSql`
//!
//! The executors in `sqlmapper-executor` drive these through statement
//! metadata; most users access them via the `sqlmapper` facade crate.

pub mod context;
pub mod expr;
pub mod fragment;
pub mod node;
pub mod source;
pub mod tokens;

pub use context::{DynamicContext, PARAMETER_KEY};
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use fragment::FragmentRegistry;
pub use node::{Foreach, SqlNode, Trim};
pub use source::{DynamicSqlSource, RawSqlSource, SqlSource, StaticSqlSource};
pub use tokens::{parse_placeholders, replace_dollar_tokens};
