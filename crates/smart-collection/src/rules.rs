//! Rule sets driving smart collection membership.
//!
//! A rule set contributes two things: a query fragment for full searches and
//! a predicate for single-item evaluation. Both must describe the same set.

use std::fmt;

use crate::types::LibraryItem;

/// Source of the rule query and the rule predicate of a smart collection.
pub trait RuleSet: Send + Sync {
    /// Query fragment for full searches; empty when there are no rules.
    fn search_query(&self) -> String;

    /// Evaluates the rules against a single item.
    fn evaluate(&self, item: &LibraryItem) -> bool;

    /// Number of rules.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single rule of a [`CompositeRuleSet`].
pub trait Rule: Send + Sync {
    fn query_fragment(&self) -> String;
    fn evaluate(&self, item: &LibraryItem) -> bool;
}

/// How the rules of a [`CompositeRuleSet`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleMatch {
    #[default]
    All,
    Any,
}

impl RuleMatch {
    fn joiner(self) -> &'static str {
        match self {
            Self::All => " and ",
            Self::Any => " or ",
        }
    }
}

/// A rule made of a fixed query fragment and a matching predicate.
pub struct PredicateRule<F> {
    fragment: String,
    predicate: F,
}

impl<F> PredicateRule<F>
where
    F: Fn(&LibraryItem) -> bool + Send + Sync,
{
    pub fn new(fragment: impl Into<String>, predicate: F) -> Self {
        Self {
            fragment: fragment.into(),
            predicate,
        }
    }
}

impl<F> Rule for PredicateRule<F>
where
    F: Fn(&LibraryItem) -> bool + Send + Sync,
{
    fn query_fragment(&self) -> String {
        self.fragment.clone()
    }

    fn evaluate(&self, item: &LibraryItem) -> bool {
        (self.predicate)(item)
    }
}

/// A rule set built from individual rules.
///
/// An empty set has no query and does not constrain items.
#[derive(Default)]
pub struct CompositeRuleSet {
    rules: Vec<Box<dyn Rule>>,
    combine: RuleMatch,
}

impl CompositeRuleSet {
    pub fn new(combine: RuleMatch) -> Self {
        Self {
            rules: Vec::new(),
            combine,
        }
    }

    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn push(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn combine(&self) -> RuleMatch {
        self.combine
    }
}

impl fmt::Debug for CompositeRuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeRuleSet")
            .field("rules", &self.rules.len())
            .field("combine", &self.combine)
            .finish()
    }
}

impl RuleSet for CompositeRuleSet {
    fn search_query(&self) -> String {
        let fragments = self
            .rules
            .iter()
            .map(|rule| rule.query_fragment())
            .filter(|fragment| !fragment.trim().is_empty())
            .collect::<Vec<_>>();
        match fragments.as_slice() {
            [] => String::new(),
            [single] => single.clone(),
            many => many
                .iter()
                .map(|fragment| format!("({fragment})"))
                .collect::<Vec<_>>()
                .join(self.combine.joiner()),
        }
    }

    fn evaluate(&self, item: &LibraryItem) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        match self.combine {
            RuleMatch::All => self.rules.iter().all(|rule| rule.evaluate(item)),
            RuleMatch::Any => self.rules.iter().any(|rule| rule.evaluate(item)),
        }
    }

    fn len(&self) -> usize {
        self.rules.len()
    }
}
