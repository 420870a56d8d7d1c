//! Name-based type rules

use crate::types::TargetType;
use serde::{Deserialize, Serialize};

/// Maps column names containing any of `tokens` to `target`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRule {
    /// Substrings matched against the uppercased column name
    pub tokens: Vec<String>,
    /// Type assigned on match
    pub target: TargetType,
}

impl TypeRule {
    /// Create a rule
    pub fn new<I, S>(tokens: I, target: TargetType) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            target,
        }
    }

    /// Check if the rule applies to a column
    pub fn matches(&self, column: &str) -> bool {
        let upper = column.to_uppercase();
        self.tokens
            .iter()
            .any(|token| upper.contains(&token.to_uppercase()))
    }
}

/// The standard rule table, in priority order
pub fn default_rules() -> Vec<TypeRule> {
    vec![
        TypeRule::new(["_COUNT", "_SCORE", "_NUMBER", "_ID"], TargetType::Integer),
        TypeRule::new(
            ["_DATE", "_TIME", "_TIMESTAMP", "_CREATED", "_UPDATED"],
            TargetType::Timestamp,
        ),
        TypeRule::new(["_AMOUNT", "_PRICE", "_VALUE", "_RATE"], TargetType::Double),
        TypeRule::new(["_FLAG", "_ENABLED", "_ACTIVE", "_PROCESS"], TargetType::Boolean),
    ]
}

/// First rule matching the column, if any
pub(crate) fn rule_for<'a>(rules: &'a [TypeRule], column: &str) -> Option<&'a TypeRule> {
    rules.iter().find(|rule| rule.matches(column))
}
