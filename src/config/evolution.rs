use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::RuleforgeError;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_enabled: bool,
    /// Percentage of the population meant to survive. Declared only: a single
    /// individual is carried over regardless.
    pub elitism_fraction: f64,
    pub elite_selection: EliteSelection,
    pub seed: Option<u64>,
    pub hall_of_fame_size: usize,
}

/// Which ranked individual is carried over, and which one is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EliteSelection {
    /// Carries the last individual of the descending ranking and reports the
    /// head of the freshly bred population.
    RankedLast,
    /// Carries and reports the head of the descending ranking.
    Best,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            generations: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.85,
            elitism_enabled: true,
            elitism_fraction: 10.0,
            elite_selection: EliteSelection::RankedLast,
            seed: None,
            hall_of_fame_size: 10,
        }
    }
}

impl ConfigSection for EvolutionConfig {
    fn section_name() -> &'static str {
        "evolution"
    }

    fn validate(&self) -> Result<(), RuleforgeError> {
        if self.population_size == 0 {
            return Err(RuleforgeError::Configuration(
                "Population size must be at least 1".to_string(),
            ));
        }
        if self.generations == 0 {
            return Err(RuleforgeError::Configuration(
                "Generations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(RuleforgeError::Configuration(
                "Mutation rate must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            return Err(RuleforgeError::Configuration(
                "Crossover rate must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.elitism_fraction) {
            return Err(RuleforgeError::Configuration(
                "Elitism fraction is a percentage between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        let defaults = Self::default();
        ConfigManifest {
            section: "Evolution".to_string(),
            fields: vec![
                FieldManifest::new(
                    "population_size",
                    "integer",
                    json!(defaults.population_size),
                    "Number of rules in every generation",
                )
                .bounded(1.0, 100_000.0),
                FieldManifest::new(
                    "generations",
                    "integer",
                    json!(defaults.generations),
                    "Number of evaluate/rank/reproduce cycles",
                )
                .bounded(1.0, 100_000.0),
                FieldManifest::new(
                    "mutation_rate",
                    "float",
                    json!(defaults.mutation_rate),
                    "Probability a child is replaced by a fresh rule",
                )
                .bounded(0.0, 1.0),
                FieldManifest::new(
                    "crossover_rate",
                    "float",
                    json!(defaults.crossover_rate),
                    "Probability two parents are recombined",
                )
                .bounded(0.0, 1.0),
                FieldManifest::new(
                    "elitism_enabled",
                    "bool",
                    json!(defaults.elitism_enabled),
                    "Carry one ranked individual into the next generation",
                ),
                FieldManifest::new(
                    "elitism_fraction",
                    "float",
                    json!(defaults.elitism_fraction),
                    "Declared survivor percentage (not applied)",
                )
                .bounded(0.0, 100.0),
                FieldManifest::new(
                    "elite_selection",
                    "enum(ranked_last|best)",
                    json!(defaults.elite_selection),
                    "Ranked individual carried over and reported",
                ),
                FieldManifest::new(
                    "seed",
                    "integer?",
                    serde_json::Value::Null,
                    "Random seed; entropy when absent",
                ),
                FieldManifest::new(
                    "hall_of_fame_size",
                    "integer",
                    json!(defaults.hall_of_fame_size),
                    "Distinct best rules kept across the run",
                )
                .bounded(0.0, 10_000.0),
            ],
        }
    }
}
