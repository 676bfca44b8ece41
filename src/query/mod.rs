//! Query parsing and sanitizing for the FTS5 engine.

mod builder;

pub use builder::{BoolOp, BuildOptions, BuiltQuery, QueryBuilder, QueryConfig, QueryCost, QueryValidation};
