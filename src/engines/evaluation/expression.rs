use crate::engines::generation::rule::Rule;
use crate::error::{EvaluationError, RuleforgeError};
use crate::types::{ComponentKind, RuleComponent};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Lt,
    Ge,
    Le,
}

impl Comparison {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            ">" => Some(Comparison::Gt),
            "<" => Some(Comparison::Lt),
            ">=" => Some(Comparison::Ge),
            "<=" => Some(Comparison::Le),
            _ => None,
        }
    }

    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Gt => lhs > rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Ge => lhs >= rhs,
            Comparison::Le => lhs <= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Le => "<=",
        }
    }
}

/// An indicator reading such as `SMA(20)` or `BBANDS(20)_upper`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorRef {
    pub family: String,
    pub period: u32,
    pub band: Option<String>,
}

impl IndicatorRef {
    pub fn parse(token: &str) -> Option<Self> {
        let open = token.find('(')?;
        let close = open + token[open..].find(')')?;
        let family = &token[..open];
        if family.is_empty() {
            return None;
        }
        let period = token[open + 1..close].parse().ok()?;
        let rest = &token[close + 1..];
        let band = if rest.is_empty() {
            None
        } else {
            let band = rest.strip_prefix('_')?;
            if band.is_empty() {
                return None;
            }
            Some(band.to_string())
        };

        Some(Self {
            family: family.to_string(),
            period,
            band,
        })
    }
}

impl fmt::Display for IndicatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.family, self.period)?;
        if let Some(band) = &self.band {
            write!(f, "_{}", band)?;
        }
        Ok(())
    }
}

/// A price or volume column, e.g. `closing_price`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValueField(pub String);

impl ValueField {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Readings available at one bar. Implemented by whatever holds the
/// precomputed indicator columns.
pub trait MarketSnapshot {
    fn indicator(&self, indicator: &IndicatorRef) -> Option<f64>;
    fn field(&self, field: &ValueField) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Indicator(IndicatorRef),
    Field(ValueField),
}

impl Operand {
    fn from_component(component: &RuleComponent) -> Result<Self, RuleforgeError> {
        match component.kind {
            ComponentKind::Indicator => IndicatorRef::parse(&component.token)
                .map(Operand::Indicator)
                .ok_or_else(|| {
                    RuleforgeError::InvalidRuleStructure(format!(
                        "malformed indicator token {:?}",
                        component.token
                    ))
                }),
            ComponentKind::Value => Ok(Operand::Field(ValueField(component.token.clone()))),
            other => Err(RuleforgeError::InvalidRuleStructure(format!(
                "expected an operand, found {} {:?}",
                other, component.token
            ))),
        }
    }

    pub fn read(&self, snapshot: &dyn MarketSnapshot) -> Result<f64, EvaluationError> {
        match self {
            Operand::Indicator(indicator) => snapshot
                .indicator(indicator)
                .ok_or_else(|| EvaluationError::UnknownIndicator(indicator.to_string())),
            Operand::Field(field) => snapshot
                .field(field)
                .ok_or_else(|| EvaluationError::UnknownField(field.to_string())),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Indicator(indicator) => indicator.fmt(f),
            Operand::Field(field) => field.fmt(f),
        }
    }
}

/// Condition tree of a rule. `and` binds tighter than `or`; both are
/// left-associative.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        lhs: Operand,
        op: Comparison,
        rhs: Operand,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn evaluate(&self, snapshot: &dyn MarketSnapshot) -> Result<bool, EvaluationError> {
        match self {
            Condition::Compare { lhs, op, rhs } => {
                Ok(op.apply(lhs.read(snapshot)?, rhs.read(snapshot)?))
            }
            Condition::And(left, right) => {
                Ok(left.evaluate(snapshot)? && right.evaluate(snapshot)?)
            }
            Condition::Or(left, right) => {
                Ok(left.evaluate(snapshot)? || right.evaluate(snapshot)?)
            }
        }
    }

    /// Number of comparisons in the tree
    pub fn clause_count(&self) -> usize {
        match self {
            Condition::Compare { .. } => 1,
            Condition::And(left, right) | Condition::Or(left, right) => {
                left.clause_count() + right.clause_count()
            }
        }
    }

    fn from_components(components: &[RuleComponent]) -> Result<Self, RuleforgeError> {
        let mut clauses = components.split(|c| c.kind == ComponentKind::Logic);
        let joiners = components
            .iter()
            .filter(|c| c.kind == ComponentKind::Logic)
            .map(|c| c.token.as_str());

        let first = clauses.next().ok_or_else(|| {
            RuleforgeError::InvalidRuleStructure("rule has no condition".to_string())
        })?;
        let mut disjuncts = Vec::new();
        let mut current = Self::compare(first)?;

        for (joiner, clause) in joiners.zip(clauses) {
            let next = Self::compare(clause)?;
            match joiner {
                "and" => current = Condition::And(Box::new(current), Box::new(next)),
                "or" => disjuncts.push(std::mem::replace(&mut current, next)),
                other => {
                    return Err(RuleforgeError::InvalidRuleStructure(format!(
                        "unsupported logic token {:?}",
                        other
                    )))
                }
            }
        }

        let mut terms = disjuncts.into_iter().chain(std::iter::once(current));
        let head = terms.next().ok_or_else(|| {
            RuleforgeError::InvalidRuleStructure("rule has no condition".to_string())
        })?;
        Ok(terms.fold(head, |acc, term| Condition::Or(Box::new(acc), Box::new(term))))
    }

    fn compare(clause: &[RuleComponent]) -> Result<Self, RuleforgeError> {
        match clause {
            [lhs, op, rhs] => {
                let op = Comparison::parse(&op.token).ok_or_else(|| {
                    RuleforgeError::InvalidRuleStructure(format!(
                        "unsupported comparison {:?}",
                        op.token
                    ))
                })?;
                Ok(Condition::Compare {
                    lhs: Operand::from_component(lhs)?,
                    op,
                    rhs: Operand::from_component(rhs)?,
                })
            }
            _ => Err(RuleforgeError::InvalidRuleStructure(format!(
                "clause has {} components, expected 3",
                clause.len()
            ))),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Compare { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op.symbol(), rhs),
            Condition::And(left, right) => write!(f, "{} and {}", left, right),
            Condition::Or(left, right) => write!(f, "{} or {}", left, right),
        }
    }
}

/// Interpretable form of a `Rule`: fire `action` when `condition` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleExpr {
    pub condition: Condition,
    pub action: String,
}

impl RuleExpr {
    pub fn from_rule(rule: &Rule) -> Result<Self, RuleforgeError> {
        Ok(Self {
            condition: Condition::from_components(rule.condition())?,
            action: rule.action().to_string(),
        })
    }

    pub fn signal(&self, snapshot: &dyn MarketSnapshot) -> Result<Option<&str>, EvaluationError> {
        if self.condition.evaluate(snapshot)? {
            Ok(Some(self.action.as_str()))
        } else {
            Ok(None)
        }
    }
}

impl fmt::Display for RuleExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if {} then {}", self.condition, self.action)
    }
}

/// One OHLCV bar plus its precomputed indicator readings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bar {
    fields: HashMap<String, f64>,
    indicators: HashMap<String, f64>,
}

impl Bar {
    pub fn ohlcv(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self::default()
            .with_field("open_price", open)
            .with_field("high_price", high)
            .with_field("low_price", low)
            .with_field("closing_price", close)
            .with_field("volume", volume)
    }

    pub fn with_field(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Keyed by the rule-string token, e.g. `BBANDS(20)_lower`
    pub fn with_indicator(mut self, token: &str, value: f64) -> Self {
        self.indicators.insert(token.to_string(), value);
        self
    }
}

impl MarketSnapshot for Bar {
    fn indicator(&self, indicator: &IndicatorRef) -> Option<f64> {
        self.indicators.get(&indicator.to_string()).copied()
    }

    fn field(&self, field: &ValueField) -> Option<f64> {
        self.fields.get(field.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_ref_parse() {
        let plain = IndicatorRef::parse("SMA(10)").unwrap();
        assert_eq!(plain.family, "SMA");
        assert_eq!(plain.period, 10);
        assert_eq!(plain.band, None);

        let band = IndicatorRef::parse("BBANDS(20)_upper").unwrap();
        assert_eq!(band.band.as_deref(), Some("upper"));
        assert_eq!(band.to_string(), "BBANDS(20)_upper");

        assert!(IndicatorRef::parse("SMA").is_none());
        assert!(IndicatorRef::parse("SMA(x)").is_none());
        assert!(IndicatorRef::parse("(10)").is_none());
        assert!(IndicatorRef::parse("SMA(10)upper").is_none());
    }
}
