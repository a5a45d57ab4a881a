//! Compiled query selectors
//!
//! A compiled filter is one conjunction map (`path → selector`, all must
//! hold) or a disjunction of such maps.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::store::{FindOptions, SortOrder};

use super::errors::TreeResult;
use super::expr::Expr;
use super::path::TreePath;

/// Scan selector: a predicate body plus cursor directives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionSelector {
    /// Serialized predicate over `it`
    pub body: String,
    /// Cursor sort over the indexed value
    pub order_by: Option<SortOrder>,
    /// Cursor limit
    pub limit: Option<usize>,
    /// Cursor skip
    pub skip: Option<usize>,
}

impl ExpressionSelector {
    /// Selector with a body and no directives
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            order_by: None,
            limit: None,
            skip: None,
        }
    }

    /// Parse the body
    pub fn predicate(&self) -> TreeResult<Expr> {
        Expr::parse(&self.body)
    }

    /// Cursor options applied before predicate evaluation
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            sort: self.order_by,
            limit: self.limit,
            skip: self.skip,
        }
    }

    /// Whether any cursor directive is set
    pub fn has_directives(&self) -> bool {
        self.order_by.is_some() || self.limit.is_some() || self.skip.is_some()
    }
}

/// How one path is matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Exact match against the node `_id`
    Literal(Value),
    /// Scan every node and keep those the predicate accepts
    Expression(ExpressionSelector),
}

impl Selector {
    /// Predicate source equivalent to this selector
    pub fn body(&self) -> String {
        match self {
            Selector::Literal(v) => format!("it == {}", v),
            Selector::Expression(e) => e.body.clone(),
        }
    }

    /// Both selectors must hold; cursor directives of `self` win
    pub fn and(self, other: Selector) -> Selector {
        let body = format!("({}) && ({})", self.body(), other.body());
        let (first, second) = (self.directives(), other.directives());
        Selector::Expression(ExpressionSelector {
            body,
            order_by: first.order_by.or(second.order_by),
            limit: first.limit.or(second.limit),
            skip: first.skip.or(second.skip),
        })
    }

    fn directives(&self) -> ExpressionSelector {
        match self {
            Selector::Literal(_) => ExpressionSelector::new(""),
            Selector::Expression(e) => e.clone(),
        }
    }
}

/// AND of per-path selectors
pub type ConjunctionMap = BTreeMap<TreePath, Selector>;

/// Output of `PathCompiler::compile`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledFilter {
    /// One conjunction
    Conjunction(ConjunctionMap),
    /// Union of conjunctions
    Disjunction(Vec<ConjunctionMap>),
}

impl CompiledFilter {
    /// Build from a list of conjunctions (one map stays a conjunction)
    pub fn from_maps(mut maps: Vec<ConjunctionMap>) -> Self {
        if maps.len() == 1 {
            CompiledFilter::Conjunction(maps.remove(0))
        } else {
            CompiledFilter::Disjunction(maps)
        }
    }

    /// All conjunction maps
    pub fn maps(&self) -> Vec<&ConjunctionMap> {
        match self {
            CompiledFilter::Conjunction(map) => vec![map],
            CompiledFilter::Disjunction(maps) => maps.iter().collect(),
        }
    }

    /// Whether this is the single empty map (match everything)
    pub fn is_match_all(&self) -> bool {
        match self {
            CompiledFilter::Conjunction(map) => map.is_empty(),
            CompiledFilter::Disjunction(_) => false,
        }
    }

    /// Whether any conjunction map is empty
    pub fn has_empty_map(&self) -> bool {
        self.maps().iter().any(|map| map.is_empty())
    }
}

/// Insert a selector, combining with any selector already on the path
pub fn insert_selector(map: &mut ConjunctionMap, path: TreePath, selector: Selector) {
    let combined = match map.remove(&path) {
        Some(existing) => existing.and(selector),
        None => selector,
    };
    map.insert(path, combined);
}
