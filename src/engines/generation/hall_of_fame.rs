use crate::engines::generation::rule::Rule;
use crate::types::FitnessScore;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Clone, Debug, Serialize)]
pub struct EliteRule {
    pub rule: Rule,
    pub fitness: FitnessScore,
    pub generation: usize,
}

/// Best distinct rules seen over a run, highest fitness first.
pub struct HallOfFame {
    rules: Vec<EliteRule>,
    max_size: usize,
    seen_rules: HashSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            rules: Vec::new(),
            max_size,
            seen_rules: HashSet::new(),
        }
    }

    /// Attempt to add a rule; returns whether it was kept
    pub fn try_add(&mut self, elite: EliteRule) -> bool {
        if self.max_size == 0 {
            return false;
        }

        let signature = elite.rule.to_rule_string();
        if self.seen_rules.contains(&signature) {
            return false;
        }

        // Full and not better than the current worst
        if self.rules.len() >= self.max_size
            && self
                .rules
                .last()
                .map_or(false, |worst| elite.fitness <= worst.fitness)
        {
            return false;
        }

        self.rules.push(elite);
        self.seen_rules.insert(signature);

        self.rules.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        while self.rules.len() > self.max_size {
            if let Some(removed) = self.rules.pop() {
                self.seen_rules.remove(&removed.rule.to_rule_string());
            }
        }

        true
    }

    pub fn get_all(&self) -> &[EliteRule] {
        &self.rules
    }

    pub fn best(&self) -> Option<&EliteRule> {
        self.rules.first()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
