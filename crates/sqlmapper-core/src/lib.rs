//! Core types and traits for SqlMapper Rust.
//!
//! This crate provides the foundational abstractions for the statement
//! mapping engine:
//!
//! - `Value` for dynamically-typed parameters and results
//! - `Row` for backing-store result rows
//! - `BoundSql` and parameter-binding descriptors
//! - `Transaction` trait for the opaque store handle
//! - `TypeHandler` seam for wire-type coercion
//! - `Configuration` for engine-wide settings
//! - the error taxonomy shared by every crate in the workspace

pub mod config;
pub mod error;
pub mod mapping;
pub mod property;
pub mod row;
pub mod transaction;
pub mod types;
pub mod value;

pub use config::{Configuration, LocalCacheScope};
pub use error::{
    CacheError, CacheErrorKind, ConfigError, Error, ExecutorError, ExecutorErrorKind, Result,
    ScriptError, ScriptErrorKind, StoreError, TransactionError, TypeError,
};
pub use mapping::{BoundSql, ParameterBinding, ParameterMode};
pub use property::{get_path, set_path};
pub use row::{ColumnInfo, Row};
pub use transaction::Transaction;
pub use types::{DefaultTypeHandler, ParameterSink, SqlType, TypeHandler};
pub use value::Value;
