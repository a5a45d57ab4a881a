//! # Tree Model
//!
//! Paths, index nodes, selectors and the path compiler.
//!
//! A document in domain `D` is decomposed into one node per
//! `(path, indexed value)`; a filter is compiled into `path → selector`
//! maps that the resolver intersects.

mod compiler;
mod errors;
mod expr;
mod node;
mod path;
mod selector;

pub use compiler::{CollectingSink, JsonTreeCompiler, NodeSink, PathCompiler};
pub use errors::{TreeError, TreeResult};
pub use expr::{CmpOp, Expr};
pub use node::{IndexNode, NodeValue};
pub use path::{TreePath, IDENTITY_FIELD, NODE_COLLECTION_PREFIX};
pub use selector::{insert_selector, CompiledFilter, ConjunctionMap, ExpressionSelector, Selector};
