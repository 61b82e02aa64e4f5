use crate::config::{AppConfig, EliteSelection, EvaluationConfig, EvolutionConfig};
use crate::engines::evaluation::{evaluate_with_timeout, FitnessEvaluator};
use crate::engines::generation::{
    generator::RuleGenerator,
    hall_of_fame::{EliteRule, HallOfFame},
    operators::{crossover, mutate, select_parents},
    population::{Individual, Population},
    rule::Rule,
};
use crate::error::{EvaluationError, RuleforgeError};
use crate::types::FitnessScore;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    /// Called on the engine thread as each result arrives from the pool
    fn on_individual_evaluated(&mut self, done: usize, total: usize);
    fn on_evaluation_failed(&mut self, rule: &Rule, error: &EvaluationError);
    fn on_generation_complete(&mut self, record: &GenerationRecord);
}

impl<C: ProgressCallback + ?Sized> ProgressCallback for &mut C {
    fn on_generation_start(&mut self, generation: usize) {
        (**self).on_generation_start(generation);
    }

    fn on_individual_evaluated(&mut self, done: usize, total: usize) {
        (**self).on_individual_evaluated(done, total);
    }

    fn on_evaluation_failed(&mut self, rule: &Rule, error: &EvaluationError) {
        (**self).on_evaluation_failed(rule, error);
    }

    fn on_generation_complete(&mut self, record: &GenerationRecord) {
        (**self).on_generation_complete(record);
    }
}

/// Per-generation report. Emitted to the callback, not retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRecord {
    pub generation: usize,
    pub best_rule: Rule,
    pub best_fitness: Option<FitnessScore>,
    pub evaluated: usize,
    pub failed: usize,
}

/// Shared stop flag. Checked between generations and before each evaluation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub population: Population,
    pub hall_of_fame: Vec<EliteRule>,
    pub generations_completed: usize,
    pub termination: Termination,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationStats {
    pub evaluated: usize,
    pub failed: usize,
}

pub struct EvolutionEngine {
    config: EvolutionConfig,
    evaluation: EvaluationConfig,
    generator: RuleGenerator,
    evaluator: Arc<dyn FitnessEvaluator>,
    hall_of_fame: HallOfFame,
    cancel: CancellationToken,
    pool: ThreadPool,
    rng: StdRng,
}

impl EvolutionEngine {
    pub fn new(
        config: &AppConfig,
        evaluator: Arc<dyn FitnessEvaluator>,
    ) -> Result<Self, RuleforgeError> {
        config.validate()?;

        let generator = RuleGenerator::from_config(&config.grammar)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.evaluation.num_threads)
            .thread_name(|i| format!("ruleforge-eval-{}", i))
            .build()?;

        let rng = match config.evolution.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            config: config.evolution.clone(),
            evaluation: config.evaluation.clone(),
            generator,
            evaluator,
            hall_of_fame: HallOfFame::new(config.evolution.hall_of_fame_size),
            cancel: CancellationToken::new(),
            pool,
            rng,
        })
    }

    /// Share an externally owned stop flag (e.g. one wired to Ctrl-C)
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn generator(&self) -> &RuleGenerator {
        &self.generator
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    /// Run the evolution process from a fresh population
    pub fn run<C: ProgressCallback>(
        &mut self,
        callback: C,
    ) -> Result<EvolutionOutcome, RuleforgeError> {
        let population = self.initialize_population()?;
        self.evolve_from(population, callback)
    }

    pub fn evolve_from<C: ProgressCallback>(
        &mut self,
        mut population: Population,
        mut callback: C,
    ) -> Result<EvolutionOutcome, RuleforgeError> {
        info!(
            "Evolving {} rules for {} generations on {} threads",
            population.len(),
            self.config.generations,
            self.pool.current_num_threads()
        );

        let mut completed = 0;
        for generation in 0..self.config.generations {
            if self.cancel.is_cancelled() {
                return Ok(self.interrupted(population, completed));
            }

            callback.on_generation_start(generation);
            let stats = self.evaluate_population(&mut population, &mut callback);

            // Partially evaluated generations are returned as they stand
            if self.cancel.is_cancelled() {
                return Ok(self.interrupted(population, completed));
            }

            population.rank();
            self.update_hall_of_fame(&population, generation);

            let next_population = self.next_generation(&population)?;
            if let Some(record) =
                self.generation_record(generation, &population, &next_population, stats)
            {
                callback.on_generation_complete(&record);
            }

            population = next_population;
            completed += 1;
        }

        info!("Evolution finished after {} generations", completed);
        Ok(EvolutionOutcome {
            population,
            hall_of_fame: self.hall_of_fame.get_all().to_vec(),
            generations_completed: completed,
            termination: Termination::Completed,
        })
    }

    pub fn initialize_population(&mut self) -> Result<Population, RuleforgeError> {
        Population::initialize(self.config.population_size, &self.generator, &mut self.rng)
    }

    /// Scores every individual without a fitness on the worker pool.
    ///
    /// Workers stream results back as they finish, so the callback sees live
    /// progress. Each result lands at its own index, keeping the outcome
    /// independent of completion order. Failures leave the fitness unset.
    pub fn evaluate_population<C: ProgressCallback>(
        &self,
        population: &mut Population,
        callback: &mut C,
    ) -> EvaluationStats {
        let pending: Vec<(usize, String)> = population
            .iter()
            .enumerate()
            .filter(|(_, individual)| !individual.is_evaluated())
            .map(|(i, individual)| (i, individual.rule.to_rule_string()))
            .collect();

        let total = pending.len();
        let mut stats = EvaluationStats::default();
        let (sender, receiver) = mpsc::channel();

        let pending = &pending;
        let pool = &self.pool;
        let evaluator = &self.evaluator;
        let cancel = &self.cancel;
        let timeout = self.evaluation.timeout();

        thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(|| {
                    pending.par_iter().for_each_with(sender, |sender, (i, rule)| {
                        if cancel.is_cancelled() {
                            return;
                        }
                        let _ = sender.send((*i, evaluate_with_timeout(evaluator, rule, timeout)));
                    })
                })
            });

            let individuals = population.individuals_mut();
            for (i, result) in receiver {
                match result {
                    Ok(score) => {
                        individuals[i].fitness = Some(score);
                        stats.evaluated += 1;
                    }
                    Err(error) => {
                        warn!("Evaluation failed for '{}': {}", individuals[i].rule, error);
                        callback.on_evaluation_failed(&individuals[i].rule, &error);
                        stats.failed += 1;
                    }
                }
                callback.on_individual_evaluated(stats.evaluated + stats.failed, total);
            }
        });

        debug!(
            "Evaluated {} rules, {} failed, {} skipped",
            stats.evaluated,
            stats.failed,
            total - stats.evaluated - stats.failed
        );
        stats
    }

    /// Breeds the next population from a ranked one.
    ///
    /// With elitism on, the carried individual comes first and keeps its
    /// fitness. Parents are drawn uniformly, ignoring rank.
    pub fn next_generation(&mut self, ranked: &Population) -> Result<Population, RuleforgeError> {
        if ranked.is_empty() {
            return Err(RuleforgeError::Configuration(
                "Cannot breed from an empty population".to_string(),
            ));
        }

        let size = self.config.population_size;
        let mut next = Vec::with_capacity(size);

        if self.config.elitism_enabled {
            let elite = match self.config.elite_selection {
                EliteSelection::RankedLast => ranked.last(),
                EliteSelection::Best => ranked.first(),
            };
            if let Some(elite) = elite {
                next.push(elite.clone());
            }
        }

        while next.len() < size {
            let (parent1, parent2) = select_parents(ranked.individuals(), &mut self.rng);
            let child = crossover(
                &parent1.rule,
                &parent2.rule,
                self.config.crossover_rate,
                &mut self.rng,
            );
            let child = mutate(child, self.config.mutation_rate, &self.generator, &mut self.rng)?;
            next.push(Individual::new(child));
        }

        Ok(Population::from_individuals(next))
    }

    fn update_hall_of_fame(&mut self, ranked: &Population, generation: usize) {
        for individual in ranked {
            if let Some(fitness) = individual.fitness {
                self.hall_of_fame.try_add(EliteRule {
                    rule: individual.rule.clone(),
                    fitness,
                    generation,
                });
            }
        }
    }

    fn generation_record(
        &self,
        generation: usize,
        ranked: &Population,
        next_population: &Population,
        stats: EvaluationStats,
    ) -> Option<GenerationRecord> {
        let reported = match self.config.elite_selection {
            EliteSelection::RankedLast => next_population.first(),
            EliteSelection::Best => ranked.first(),
        }?;

        Some(GenerationRecord {
            generation,
            best_rule: reported.rule.clone(),
            best_fitness: reported.fitness,
            evaluated: stats.evaluated,
            failed: stats.failed,
        })
    }

    fn interrupted(&self, population: Population, completed: usize) -> EvolutionOutcome {
        info!("Evolution interrupted after {} generations", completed);
        EvolutionOutcome {
            population,
            hall_of_fame: self.hall_of_fame.get_all().to_vec(),
            generations_completed: completed,
            termination: Termination::Interrupted,
        }
    }
}
