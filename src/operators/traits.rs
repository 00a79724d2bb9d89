//! Operator trait definition.

use crate::engine::Transaction;
use std::collections::HashMap;
use std::path::PathBuf;

/// Options handed to an operator factory.
#[derive(Debug, Default, Clone)]
pub struct OperatorOptions {
    /// Literal argument string from the rule definition.
    pub arguments: String,
    /// Named in-memory pattern sets for the `*FromDataset` operators.
    pub datasets: HashMap<String, Vec<String>>,
    /// Directories searched when an operator loads a relative file path.
    pub search_paths: Vec<PathBuf>,
}

/// A compiled rule predicate.
///
/// Operators are built once at rule-load time and shared across
/// transactions, so implementations must be immutable after construction.
/// Capture writes go through [`Transaction::capture_field`], which is a
/// no-op unless the current rule enabled capturing.
pub trait Operator: Send + Sync {
    /// Run the predicate against one argument value.
    fn evaluate(&self, tx: &mut Transaction, value: &str) -> bool;

    /// Name as it appears in rule definitions.
    fn name(&self) -> &'static str;
}
