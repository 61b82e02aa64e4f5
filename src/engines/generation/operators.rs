use crate::engines::generation::{
    generator::RuleGenerator,
    labeler::{self, RuleLabeler},
    population::Individual,
    rule::Rule,
};
use crate::error::RuleforgeError;
use crate::types::RuleComponent;
use log::debug;
use rand::seq::index;
use rand::Rng;

/// Two distinct parents drawn uniformly at random. Rank is ignored.
///
/// A single-individual population yields that individual twice. Panics on an
/// empty population.
pub fn select_parents<'a, R: Rng>(
    population: &'a [Individual],
    rng: &mut R,
) -> (&'a Individual, &'a Individual) {
    if population.len() < 2 {
        return (&population[0], &population[0]);
    }
    let picked = index::sample(rng, population.len(), 2);
    (&population[picked.index(0)], &population[picked.index(1)])
}

/// Single-point crossover on component sequences with independent cut points.
///
/// With probability `1 - crossover_rate` the first parent is returned as is.
/// Otherwise the prefix of `parent1` up to its cut is joined to the suffix of
/// `parent2` from its cut; a child that does not validate falls back to `parent1`.
pub fn crossover<R: Rng>(
    parent1: &Rule,
    parent2: &Rule,
    crossover_rate: f64,
    rng: &mut R,
) -> Rule {
    if rng.gen::<f64>() >= crossover_rate {
        return parent1.clone();
    }

    match splice(parent1.components(), parent2.components(), rng) {
        Some(child) => child,
        None => parent1.clone(),
    }
}

/// Cuts both sequences at a point in `[1, len - 1]` and validates the join
fn splice<R: Rng>(
    first: &[RuleComponent],
    second: &[RuleComponent],
    rng: &mut R,
) -> Option<Rule> {
    if first.len() < 2 || second.len() < 2 {
        return None;
    }
    let cut1 = rng.gen_range(1..first.len());
    let cut2 = rng.gen_range(1..second.len());

    let child: Vec<RuleComponent> = first[..cut1]
        .iter()
        .chain(&second[cut2..])
        .cloned()
        .collect();

    match Rule::from_components(child) {
        Ok(rule) => Some(rule),
        Err(_) => {
            debug!("Crossover at ({}, {}) broke the rule shape, keeping parent", cut1, cut2);
            None
        }
    }
}

/// Crossover over raw rule strings.
///
/// Both parents are labeled first; when either fails validation, `parent1` is
/// returned unchanged. Never returns a malformed rule other than an untouched
/// `parent1`.
pub fn crossover_rule_strings<R: Rng>(
    parent1: &str,
    parent2: &str,
    labeler: &RuleLabeler,
    crossover_rate: f64,
    rng: &mut R,
) -> String {
    if rng.gen::<f64>() >= crossover_rate {
        return parent1.to_string();
    }

    let components1 = labeler.label(parent1);
    let components2 = labeler.label(parent2);
    if !labeler::validate(&components1) || !labeler::validate(&components2) {
        return parent1.to_string();
    }

    match splice(&components1, &components2, rng) {
        Some(child) => child.to_rule_string(),
        None => parent1.to_string(),
    }
}

/// Whole-rule replacement: with probability `mutation_rate` the rule is
/// discarded for a freshly generated one.
pub fn mutate<R: Rng>(
    rule: Rule,
    mutation_rate: f64,
    generator: &RuleGenerator,
    rng: &mut R,
) -> Result<Rule, RuleforgeError> {
    if rng.gen::<f64>() < mutation_rate {
        generator.generate(rng)
    } else {
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_splice_rejects_short_sequences() {
        let mut rng = StdRng::seed_from_u64(3);
        let single = vec![RuleComponent::new(crate::types::ComponentKind::Action, "buy")];
        assert!(splice(&single, &single, &mut rng).is_none());
    }
}
