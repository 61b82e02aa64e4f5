use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar performance of a rule, usually a percentage return. May be negative.
pub type FitnessScore = f64;

/// Grammatical role of a token inside a rule string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Indicator,
    Operator,
    Value,
    Logic,
    Action,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Indicator => "indicator",
            ComponentKind::Operator => "operator",
            ComponentKind::Value => "value",
            ComponentKind::Logic => "logic",
            ComponentKind::Action => "action",
        };
        f.pad(name)
    }
}

/// A labeled token. The `if`/`then` keywords are never represented.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleComponent {
    pub kind: ComponentKind,
    pub token: String,
}

impl RuleComponent {
    pub fn new(kind: ComponentKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
        }
    }
}

impl fmt::Display for RuleComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.token)
    }
}
