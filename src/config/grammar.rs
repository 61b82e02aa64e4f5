use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::RuleforgeError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// An indicator family, instantiated once per lookback period.
///
/// Families with bands (BBANDS) produce one token per band, e.g. `BBANDS(20)_upper`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorFamily {
    pub name: String,
    #[serde(default)]
    pub bands: Vec<String>,
}

impl IndicatorFamily {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            bands: Vec::new(),
        }
    }

    pub fn banded(name: &str, bands: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            bands: bands.iter().map(|b| b.to_string()).collect(),
        }
    }

    /// Rule-string tokens for this family at one period
    pub fn tokens(&self, period: u32) -> Vec<String> {
        if self.bands.is_empty() {
            vec![format!("{}({})", self.name, period)]
        } else {
            self.bands
                .iter()
                .map(|band| format!("{}({})_{}", self.name, period, band))
                .collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrammarConfig {
    pub indicator_families: Vec<IndicatorFamily>,
    pub indicator_periods: Vec<u32>,
    pub operators: Vec<String>,
    pub value_fields: Vec<String>,
    pub actions: Vec<String>,
    pub logic: Vec<String>,
    /// Number of joined clauses per condition shape
    pub clause_counts: Vec<usize>,
    pub max_expansion_steps: usize,
}

impl Default for GrammarConfig {
    fn default() -> Self {
        Self {
            indicator_families: vec![
                IndicatorFamily::new("SMA"),
                IndicatorFamily::new("EMA"),
                IndicatorFamily::new("RSI"),
                IndicatorFamily::banded("BBANDS", &["upper", "lower"]),
                IndicatorFamily::new("ATR"),
            ],
            indicator_periods: vec![10, 20, 50],
            operators: strings(&[">", "<", ">=", "<="]),
            value_fields: strings(&[
                "closing_price",
                "open_price",
                "high_price",
                "low_price",
                "volume",
            ]),
            actions: strings(&["buy", "sell"]),
            logic: strings(&["and", "or"]),
            clause_counts: vec![2, 3, 4],
            max_expansion_steps: 256,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl GrammarConfig {
    /// Every indicator token the grammar can emit, family-major then period
    pub fn indicator_tokens(&self) -> Vec<String> {
        self.indicator_families
            .iter()
            .flat_map(|family| {
                self.indicator_periods
                    .iter()
                    .flat_map(move |&period| family.tokens(period))
            })
            .collect()
    }

    /// Logic token used to join clauses in generated conditions
    pub fn joiner(&self) -> &str {
        self.logic.first().map(String::as_str).unwrap_or("and")
    }

    fn require_non_empty<T>(items: &[T], what: &str) -> Result<(), RuleforgeError> {
        if items.is_empty() {
            return Err(RuleforgeError::Configuration(format!(
                "Grammar needs at least one {}",
                what
            )));
        }
        Ok(())
    }
}

impl ConfigSection for GrammarConfig {
    fn section_name() -> &'static str {
        "grammar"
    }

    fn validate(&self) -> Result<(), RuleforgeError> {
        Self::require_non_empty(&self.indicator_families, "indicator family")?;
        Self::require_non_empty(&self.indicator_periods, "indicator period")?;
        Self::require_non_empty(&self.operators, "operator")?;
        Self::require_non_empty(&self.value_fields, "value field")?;
        Self::require_non_empty(&self.actions, "action")?;
        Self::require_non_empty(&self.logic, "logic token")?;
        Self::require_non_empty(&self.clause_counts, "clause count")?;

        if self.clause_counts.contains(&0) {
            return Err(RuleforgeError::Configuration(
                "Clause counts must be at least 1".to_string(),
            ));
        }
        if self.max_expansion_steps == 0 {
            return Err(RuleforgeError::Configuration(
                "max_expansion_steps must be positive".to_string(),
            ));
        }
        if self.indicator_periods.contains(&0) {
            return Err(RuleforgeError::Configuration(
                "Indicator periods must be positive".to_string(),
            ));
        }

        let terminals = self
            .operators
            .iter()
            .chain(&self.value_fields)
            .chain(&self.actions)
            .chain(&self.logic);
        for token in terminals.clone() {
            if token.is_empty() || token.chars().any(char::is_whitespace) {
                return Err(RuleforgeError::Configuration(format!(
                    "Terminal {:?} must be a single non-empty word",
                    token
                )));
            }
            if token == "if" || token == "then" {
                return Err(RuleforgeError::Configuration(format!(
                    "Terminal {:?} collides with a rule keyword",
                    token
                )));
            }
        }

        // The labeler classifies indicators by family-name containment
        for family in &self.indicator_families {
            if family.name.is_empty() || family.name.chars().any(char::is_whitespace) {
                return Err(RuleforgeError::Configuration(format!(
                    "Indicator family name {:?} must be a single non-empty word",
                    family.name
                )));
            }
            if let Some(clash) = terminals.clone().find(|t| t.contains(&family.name)) {
                return Err(RuleforgeError::Configuration(format!(
                    "Terminal {:?} contains indicator family name {:?}",
                    clash, family.name
                )));
            }
        }

        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        let defaults = Self::default();
        ConfigManifest {
            section: "Grammar".to_string(),
            fields: vec![
                FieldManifest::new(
                    "indicator_families",
                    "list<family>",
                    json!(defaults.indicator_families),
                    "Indicator families with optional band suffixes",
                ),
                FieldManifest::new(
                    "indicator_periods",
                    "list<integer>",
                    json!(defaults.indicator_periods),
                    "Lookback periods every family is instantiated at",
                ),
                FieldManifest::new(
                    "operators",
                    "list<string>",
                    json!(defaults.operators),
                    "Comparison operators",
                ),
                FieldManifest::new(
                    "value_fields",
                    "list<string>",
                    json!(defaults.value_fields),
                    "Price/volume fields an indicator is compared against",
                ),
                FieldManifest::new(
                    "actions",
                    "list<string>",
                    json!(defaults.actions),
                    "Action terminals",
                ),
                FieldManifest::new(
                    "logic",
                    "list<string>",
                    json!(defaults.logic),
                    "Recognised logic tokens; the first joins generated clauses",
                ),
                FieldManifest::new(
                    "clause_counts",
                    "list<integer>",
                    json!(defaults.clause_counts),
                    "Clause counts of the condition shapes",
                ),
                FieldManifest::new(
                    "max_expansion_steps",
                    "integer",
                    json!(defaults.max_expansion_steps),
                    "Substitution cap before a derivation is declared non-terminating",
                )
                .bounded(1.0, 100_000.0),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banded_family_tokens() {
        let family = IndicatorFamily::banded("BBANDS", &["upper", "lower"]);
        assert_eq!(
            family.tokens(20),
            vec!["BBANDS(20)_upper".to_string(), "BBANDS(20)_lower".to_string()]
        );
    }

    #[test]
    fn test_default_indicator_token_count() {
        let config = GrammarConfig::default();
        // four plain families + two bands, three periods each
        assert_eq!(config.indicator_tokens().len(), 18);
    }

    #[test]
    fn test_family_name_clash_rejected() {
        let mut config = GrammarConfig::default();
        config.indicator_families.push(IndicatorFamily::new("price"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_keyword_terminal_rejected() {
        let mut config = GrammarConfig::default();
        config.actions.push("then".to_string());
        assert!(config.validate().is_err());
    }
}
