use crate::engines::generation::{generator::RuleGenerator, rule::Rule};
use crate::error::RuleforgeError;
use crate::types::FitnessScore;
use rand::Rng;
use std::cmp::Ordering;

/// One candidate rule and its fitness, absent until a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub rule: Rule,
    pub fitness: Option<FitnessScore>,
}

impl Individual {
    pub fn new(rule: Rule) -> Self {
        Self { rule, fitness: None }
    }

    pub fn with_fitness(rule: Rule, fitness: FitnessScore) -> Self {
        Self {
            rule,
            fitness: Some(fitness),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }
}

/// Descending fitness order; unset fitness sorts after every score.
pub fn compare_fitness(a: Option<FitnessScore>, b: Option<FitnessScore>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    pub fn initialize<R: Rng>(
        size: usize,
        generator: &RuleGenerator,
        rng: &mut R,
    ) -> Result<Self, RuleforgeError> {
        let individuals = (0..size)
            .map(|_| generator.generate(rng).map(Individual::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { individuals })
    }

    pub fn from_individuals(individuals: Vec<Individual>) -> Self {
        Self { individuals }
    }

    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    pub(crate) fn individuals_mut(&mut self) -> &mut [Individual] {
        &mut self.individuals
    }

    pub fn into_individuals(self) -> Vec<Individual> {
        self.individuals
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Individual> {
        self.individuals.iter()
    }

    pub fn first(&self) -> Option<&Individual> {
        self.individuals.first()
    }

    pub fn last(&self) -> Option<&Individual> {
        self.individuals.last()
    }

    /// Stable sort by fitness, best first
    pub fn rank(&mut self) {
        self.individuals
            .sort_by(|a, b| compare_fitness(a.fitness, b.fitness));
    }

    /// Highest-scoring individual regardless of current order
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter(|ind| ind.is_evaluated())
            .min_by(|a, b| compare_fitness(a.fitness, b.fitness))
    }

    pub fn evaluated_count(&self) -> usize {
        self.individuals.iter().filter(|ind| ind.is_evaluated()).count()
    }
}

impl<'a> IntoIterator for &'a Population {
    type Item = &'a Individual;
    type IntoIter = std::slice::Iter<'a, Individual>;

    fn into_iter(self) -> Self::IntoIter {
        self.individuals.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_fitness_unset_is_worst() {
        assert_eq!(compare_fitness(Some(-50.0), None), Ordering::Less);
        assert_eq!(compare_fitness(None, Some(-50.0)), Ordering::Greater);
        assert_eq!(compare_fitness(Some(3.0), Some(1.0)), Ordering::Less);
    }
}
