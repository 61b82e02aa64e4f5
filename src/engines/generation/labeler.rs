use crate::config::GrammarConfig;
use crate::types::{ComponentKind, RuleComponent};
use std::collections::HashSet;

pub const IF_KEYWORD: &str = "if";
pub const THEN_KEYWORD: &str = "then";

/// Recovers typed components from a flat rule string.
///
/// Classification is best effort: tokens that match nothing are dropped, so the
/// labeled sequence may be shorter than the token count of the input.
#[derive(Debug, Clone)]
pub struct RuleLabeler {
    families: Vec<String>,
    operators: HashSet<String>,
    values: HashSet<String>,
    logic: HashSet<String>,
    actions: HashSet<String>,
}

impl RuleLabeler {
    pub fn new(config: &GrammarConfig) -> Self {
        Self {
            families: config
                .indicator_families
                .iter()
                .map(|family| family.name.clone())
                .collect(),
            operators: config.operators.iter().cloned().collect(),
            values: config.value_fields.iter().cloned().collect(),
            logic: config.logic.iter().cloned().collect(),
            actions: config.actions.iter().cloned().collect(),
        }
    }

    pub fn classify(&self, token: &str) -> Option<ComponentKind> {
        if token == IF_KEYWORD || token == THEN_KEYWORD {
            return None;
        }
        if self.families.iter().any(|family| token.contains(family.as_str())) {
            Some(ComponentKind::Indicator)
        } else if self.operators.contains(token) {
            Some(ComponentKind::Operator)
        } else if self.values.contains(token) {
            Some(ComponentKind::Value)
        } else if self.logic.contains(token) {
            Some(ComponentKind::Logic)
        } else if self.actions.contains(token) {
            Some(ComponentKind::Action)
        } else {
            None
        }
    }

    pub fn label(&self, rule: &str) -> Vec<RuleComponent> {
        rule.split_whitespace()
            .filter_map(|token| {
                self.classify(token)
                    .map(|kind| RuleComponent::new(kind, token))
            })
            .collect()
    }
}

impl Default for RuleLabeler {
    fn default() -> Self {
        Self::new(&GrammarConfig::default())
    }
}

/// Checks `(indicator operator value) (logic (indicator operator value))* action`.
pub fn validate(components: &[RuleComponent]) -> bool {
    validate_kinds(components.iter().map(|c| c.kind))
}

pub(crate) fn validate_kinds<I>(kinds: I) -> bool
where
    I: IntoIterator<Item = ComponentKind>,
{
    const CLAUSE: [ComponentKind; 3] = [
        ComponentKind::Indicator,
        ComponentKind::Operator,
        ComponentKind::Value,
    ];

    let mut kinds = kinds.into_iter().peekable();
    loop {
        for expected in CLAUSE {
            if kinds.next() != Some(expected) {
                return false;
            }
        }
        if kinds.peek() == Some(&ComponentKind::Logic) {
            kinds.next();
            continue;
        }
        break;
    }

    kinds.next() == Some(ComponentKind::Action) && kinds.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(labeler: &RuleLabeler, rule: &str) -> Vec<ComponentKind> {
        labeler.label(rule).into_iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_keywords_and_unknown_tokens_dropped() {
        let labeler = RuleLabeler::default();
        assert_eq!(
            kinds(&labeler, "if RSI(20) <= 30 then buy"),
            vec![
                ComponentKind::Indicator,
                ComponentKind::Operator,
                ComponentKind::Action
            ]
        );
    }

    #[test]
    fn test_band_suffix_is_indicator() {
        let labeler = RuleLabeler::default();
        assert_eq!(
            labeler.classify("BBANDS(50)_lower"),
            Some(ComponentKind::Indicator)
        );
    }

    #[test]
    fn test_validate_kinds_empty() {
        assert!(!validate_kinds(Vec::new()));
    }

    #[test]
    fn test_validate_kinds_extra_action() {
        assert!(!validate_kinds(vec![
            ComponentKind::Indicator,
            ComponentKind::Operator,
            ComponentKind::Value,
            ComponentKind::Action,
            ComponentKind::Action,
        ]));
    }
}
