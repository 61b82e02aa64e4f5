use crate::engines::generation::labeler::{self, RuleLabeler, IF_KEYWORD, THEN_KEYWORD};
use crate::error::RuleforgeError;
use crate::types::{ComponentKind, RuleComponent};
use serde::{Serialize, Serializer};
use std::fmt;

/// A structurally valid trading rule, kept as its typed component sequence.
///
/// The textual form (`if <condition> then <action>`) is only produced at the
/// evaluator boundary, through `Display`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    components: Vec<RuleComponent>,
}

impl Rule {
    pub fn from_components(components: Vec<RuleComponent>) -> Result<Self, RuleforgeError> {
        if !labeler::validate(&components) {
            let shape: Vec<String> = components.iter().map(|c| c.kind.to_string()).collect();
            return Err(RuleforgeError::InvalidRuleStructure(format!(
                "unexpected component order [{}]",
                shape.join(", ")
            )));
        }
        Ok(Self { components })
    }

    pub fn parse(text: &str, labeler: &RuleLabeler) -> Result<Self, RuleforgeError> {
        Self::from_components(labeler.label(text)).map_err(|e| match e {
            RuleforgeError::InvalidRuleStructure(detail) => {
                RuleforgeError::InvalidRuleStructure(format!("{:?}: {}", text, detail))
            }
            other => other,
        })
    }

    pub fn components(&self) -> &[RuleComponent] {
        &self.components
    }

    pub fn into_components(self) -> Vec<RuleComponent> {
        self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Everything before the trailing action
    pub fn condition(&self) -> &[RuleComponent] {
        &self.components[..self.components.len() - 1]
    }

    pub fn action(&self) -> &str {
        &self.components[self.components.len() - 1].token
    }

    pub fn clause_count(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.kind == ComponentKind::Indicator)
            .count()
    }

    pub fn to_rule_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", IF_KEYWORD)?;
        for component in self.condition() {
            write!(f, " {}", component.token)?;
        }
        write!(f, " {} {}", THEN_KEYWORD, self.action())
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
