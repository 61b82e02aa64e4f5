use ruleforge::config::{AppConfig, EliteSelection};
use ruleforge::engines::evaluation::{evaluate_with_timeout, FitnessEvaluator};
use ruleforge::engines::generation::evolution_engine::{
    CancellationToken, EvolutionEngine, GenerationRecord, ProgressCallback, Termination,
};
use ruleforge::engines::generation::{
    validate, ChannelProgressCallback, EliteRule, HallOfFame, Population, ProgressMessage, Rule,
    RuleLabeler,
};
use ruleforge::error::EvaluationError;
use ruleforge::types::FitnessScore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Collects what the engine reports
#[derive(Default)]
struct TestProgressCallback {
    records: Vec<GenerationRecord>,
    failures: usize,
    evaluated: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl ProgressCallback for TestProgressCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_individual_evaluated(&mut self, _done: usize, _total: usize) {
        self.evaluated += 1;
    }

    fn on_evaluation_failed(&mut self, _rule: &Rule, _error: &EvaluationError) {
        self.failures += 1;
    }

    fn on_generation_complete(&mut self, record: &GenerationRecord) {
        self.records.push(record.clone());
        if let Some((generation, token)) = &self.cancel_after {
            if record.generation == *generation {
                token.cancel();
            }
        }
    }
}

fn test_config(population: usize, generations: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.evolution.population_size = population;
    config.evolution.generations = generations;
    config.evolution.seed = Some(42);
    config.evaluation.num_threads = 2;
    config
}

fn length_evaluator() -> Arc<dyn FitnessEvaluator> {
    Arc::new(|rule: &str| -> Result<FitnessScore, EvaluationError> { Ok(rule.len() as f64) })
}

fn ranked_population(engine: &mut EvolutionEngine) -> Population {
    let mut population = engine.initialize_population().unwrap();
    engine.evaluate_population(&mut population, &mut TestProgressCallback::default());
    population.rank();
    population
}

#[test]
fn test_population_size_constant_across_generations() {
    let config = test_config(20, 4);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let mut callback = TestProgressCallback::default();

    let mut population = engine.initialize_population().unwrap();
    assert_eq!(population.len(), 20);
    for _ in 0..config.evolution.generations {
        engine.evaluate_population(&mut population, &mut callback);
        population.rank();
        population = engine.next_generation(&population).unwrap();
        assert_eq!(population.len(), 20);
    }
}

#[test]
fn test_population_size_without_elitism() {
    let mut config = test_config(15, 1);
    config.evolution.elitism_enabled = false;
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();

    let ranked = ranked_population(&mut engine);
    let next = engine.next_generation(&ranked).unwrap();
    assert_eq!(next.len(), 15);
    assert!(next.iter().all(|individual| individual.fitness.is_none()));
}

#[test]
fn test_elite_is_last_of_ranking_by_default() {
    let config = test_config(20, 1);
    assert_eq!(config.evolution.elite_selection, EliteSelection::RankedLast);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();

    let ranked = ranked_population(&mut engine);
    let next = engine.next_generation(&ranked).unwrap();
    assert_eq!(next.first(), ranked.last());
    assert!(next.first().unwrap().fitness.is_some());
    assert!(next.iter().skip(1).all(|individual| individual.fitness.is_none()));
}

#[test]
fn test_elite_is_best_when_configured() {
    let mut config = test_config(20, 1);
    config.evolution.elite_selection = EliteSelection::Best;
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();

    let ranked = ranked_population(&mut engine);
    let next = engine.next_generation(&ranked).unwrap();
    assert_eq!(next.first(), ranked.first());
    assert_eq!(next.first().map(|i| i.fitness), ranked.best().map(|i| i.fitness));
}

#[test]
fn test_offspring_are_valid_rules() {
    let config = test_config(40, 1);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let labeler = RuleLabeler::default();

    let ranked = ranked_population(&mut engine);
    let next = engine.next_generation(&ranked).unwrap();
    for individual in &next {
        assert!(validate(&labeler.label(&individual.rule.to_rule_string())));
    }
}

#[test]
fn test_same_seed_same_next_population() {
    let config = test_config(25, 1);

    let next_population = || {
        let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
        let ranked = ranked_population(&mut engine);
        engine.next_generation(&ranked).unwrap()
    };

    assert_eq!(next_population(), next_population());
}

#[test]
fn test_same_seed_same_run() {
    let config = test_config(12, 3);
    let run = || {
        let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
        engine.run(TestProgressCallback::default()).unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.population, second.population);
    let rules = |elites: &[EliteRule]| -> Vec<String> {
        elites.iter().map(|e| e.rule.to_rule_string()).collect()
    };
    assert_eq!(rules(&first.hall_of_fame), rules(&second.hall_of_fame));
}

#[test]
fn test_run_completes_and_reports_each_generation() {
    let config = test_config(16, 3);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let (sender, receiver) = mpsc::channel();

    let outcome = engine.run(ChannelProgressCallback::new(sender)).unwrap();
    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.generations_completed, 3);
    assert_eq!(outcome.population.len(), 16);

    let messages: Vec<ProgressMessage> = receiver.try_iter().collect();
    let completed: Vec<&GenerationRecord> = messages
        .iter()
        .filter_map(|message| match message {
            ProgressMessage::GenerationComplete(record) => Some(record),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 3);
    assert_eq!(completed[0].generation, 0);
    assert_eq!(completed[0].evaluated, 16);
    assert_eq!(completed[0].failed, 0);
    // The carried elite keeps its score and is not re-evaluated
    assert_eq!(completed[1].evaluated, 15);
    assert!(messages
        .iter()
        .any(|m| matches!(m, ProgressMessage::GenerationStart(2))));
}

#[test]
fn test_report_follows_elite_selection() {
    for (selection, expect_best) in [(EliteSelection::RankedLast, false), (EliteSelection::Best, true)] {
        let mut config = test_config(20, 1);
        config.evolution.elite_selection = selection;
        let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();

        let initial = engine.initialize_population().unwrap();
        let lengths: Vec<f64> = initial
            .iter()
            .map(|i| i.rule.to_rule_string().len() as f64)
            .collect();
        let max = lengths.iter().cloned().fold(f64::MIN, f64::max);
        let min = lengths.iter().cloned().fold(f64::MAX, f64::min);

        let mut callback = TestProgressCallback::default();
        let outcome = engine.evolve_from(initial, &mut callback).unwrap();
        assert_eq!(outcome.generations_completed, 1);

        let reported = callback.records[0].best_fitness;
        if expect_best {
            assert_eq!(reported, Some(max));
        } else {
            assert_eq!(reported, Some(min));
        }
    }
}

#[test]
fn test_failed_evaluations_are_isolated() {
    let config = test_config(30, 1);
    let evaluator: Arc<dyn FitnessEvaluator> =
        Arc::new(|rule: &str| -> Result<FitnessScore, EvaluationError> {
            if rule.ends_with("then buy") {
                Err(EvaluationError::UnknownIndicator("SMA(10)".to_string()))
            } else if rule.contains("ATR(") {
                Ok(f64::NAN)
            } else {
                Ok(rule.len() as f64)
            }
        });
    let mut engine = EvolutionEngine::new(&config, evaluator).unwrap();
    let mut callback = TestProgressCallback::default();

    let mut population = engine.initialize_population().unwrap();
    let stats = engine.evaluate_population(&mut population, &mut callback);

    let buys = population
        .iter()
        .filter(|i| i.rule.action() == "buy")
        .count();
    assert_eq!(stats.evaluated + stats.failed, 30);
    assert_eq!(callback.failures, stats.failed);
    assert!(stats.failed >= buys);
    for individual in &population {
        if individual.rule.action() == "buy" {
            assert!(individual.fitness.is_none());
        }
    }

    // Unscored individuals rank last and the population is still bred
    population.rank();
    if let Some(first_unscored) = population.iter().position(|i| i.fitness.is_none()) {
        assert!(population.iter().skip(first_unscored).all(|i| i.fitness.is_none()));
    }
    let next = engine.next_generation(&population).unwrap();
    assert_eq!(next.len(), 30);
}

#[test]
fn test_panicking_evaluator_does_not_abort_run() {
    let config = test_config(10, 2);
    let evaluator: Arc<dyn FitnessEvaluator> =
        Arc::new(|rule: &str| -> Result<FitnessScore, EvaluationError> {
            if rule.ends_with("sell") {
                panic!("backtester crashed");
            }
            Ok(1.0)
        });
    let mut engine = EvolutionEngine::new(&config, evaluator).unwrap();

    let outcome = engine.run(TestProgressCallback::default()).unwrap();
    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.population.len(), 10);
    assert!(outcome
        .hall_of_fame
        .iter()
        .all(|elite| elite.rule.action() == "buy"));
}

#[test]
fn test_cancel_before_run_returns_initial_population() {
    let config = test_config(8, 5);
    let engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let token = CancellationToken::new();
    let mut engine = engine.with_cancellation(token.clone());
    token.cancel();

    let outcome = engine.run(TestProgressCallback::default()).unwrap();
    assert_eq!(outcome.termination, Termination::Interrupted);
    assert_eq!(outcome.generations_completed, 0);
    assert_eq!(outcome.population.len(), 8);
    assert_eq!(outcome.population.evaluated_count(), 0);
}

#[test]
fn test_cancel_between_generations() {
    let config = test_config(10, 5);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let callback = TestProgressCallback {
        cancel_after: Some((1, engine.cancellation_token())),
        ..TestProgressCallback::default()
    };

    let outcome = engine.run(callback).unwrap();
    assert_eq!(outcome.termination, Termination::Interrupted);
    assert_eq!(outcome.generations_completed, 2);
    assert_eq!(outcome.population.len(), 10);
    assert!(!outcome.hall_of_fame.is_empty());
}

#[test]
fn test_cancel_during_evaluation_skips_remaining_rules() {
    let mut config = test_config(50, 3);
    config.evaluation.num_threads = 1;
    let token = CancellationToken::new();
    let trigger = token.clone();
    let evaluator: Arc<dyn FitnessEvaluator> =
        Arc::new(move |_rule: &str| -> Result<FitnessScore, EvaluationError> {
            trigger.cancel();
            Ok(1.0)
        });
    let mut engine = EvolutionEngine::new(&config, evaluator)
        .unwrap()
        .with_cancellation(token);

    let outcome = engine.run(TestProgressCallback::default()).unwrap();
    assert_eq!(outcome.termination, Termination::Interrupted);
    assert_eq!(outcome.generations_completed, 0);
    assert_eq!(outcome.population.len(), 50);
    assert!(outcome.population.evaluated_count() < 50);
}

/// Releases a held evaluation once progress has been reported
struct ReleasingCallback {
    release: mpsc::Sender<()>,
    reported: usize,
}

impl ProgressCallback for ReleasingCallback {
    fn on_generation_start(&mut self, _generation: usize) {}

    fn on_individual_evaluated(&mut self, _done: usize, _total: usize) {
        self.reported += 1;
        let _ = self.release.send(());
    }

    fn on_evaluation_failed(&mut self, _rule: &Rule, _error: &EvaluationError) {}

    fn on_generation_complete(&mut self, _record: &GenerationRecord) {}
}

#[test]
fn test_progress_is_reported_while_evaluations_run() {
    let config = test_config(6, 1);
    let (release, held) = mpsc::channel::<()>();
    let held = Mutex::new(held);
    let calls = AtomicUsize::new(0);

    // The first evaluation only succeeds if progress for another rule is
    // reported while it is still running
    let evaluator: Arc<dyn FitnessEvaluator> =
        Arc::new(move |rule: &str| -> Result<FitnessScore, EvaluationError> {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let receiver = held.lock().unwrap();
                receiver
                    .recv_timeout(Duration::from_secs(5))
                    .map_err(|_| EvaluationError::Failed("no progress reported".to_string()))?;
            }
            Ok(rule.len() as f64)
        });
    let mut engine = EvolutionEngine::new(&config, evaluator).unwrap();
    let mut callback = ReleasingCallback {
        release,
        reported: 0,
    };

    let mut population = engine.initialize_population().unwrap();
    let stats = engine.evaluate_population(&mut population, &mut callback);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.evaluated, 6);
    assert_eq!(callback.reported, 6);
}

#[test]
fn test_slow_evaluation_times_out() {
    let slow: Arc<dyn FitnessEvaluator> =
        Arc::new(|_rule: &str| -> Result<FitnessScore, EvaluationError> {
            thread::sleep(Duration::from_millis(500));
            Ok(1.0)
        });
    let limit = Duration::from_millis(20);
    assert_eq!(
        evaluate_with_timeout(&slow, "if SMA(10) > volume then buy", Some(limit)),
        Err(EvaluationError::TimedOut(limit))
    );

    let fast = length_evaluator();
    assert_eq!(
        evaluate_with_timeout(&fast, "abc", Some(Duration::from_secs(5))),
        Ok(3.0)
    );
    assert_eq!(evaluate_with_timeout(&fast, "abcd", None), Ok(4.0));
}

#[test]
fn test_non_finite_scores_are_failures() {
    let infinite: Arc<dyn FitnessEvaluator> =
        Arc::new(|_rule: &str| -> Result<FitnessScore, EvaluationError> { Ok(f64::INFINITY) });
    assert!(matches!(
        evaluate_with_timeout(&infinite, "rule", None),
        Err(EvaluationError::NonFinite(_))
    ));
}

#[test]
fn test_hall_of_fame_is_distinct_and_sorted() {
    let config = test_config(20, 4);
    let mut engine = EvolutionEngine::new(&config, length_evaluator()).unwrap();
    let outcome = engine.run(TestProgressCallback::default()).unwrap();

    let hof = &outcome.hall_of_fame;
    assert!(!hof.is_empty());
    assert!(hof.len() <= config.evolution.hall_of_fame_size);
    assert!(hof.windows(2).all(|pair| pair[0].fitness >= pair[1].fitness));

    let mut rules: Vec<String> = hof.iter().map(|e| e.rule.to_rule_string()).collect();
    rules.sort();
    rules.dedup();
    assert_eq!(rules.len(), hof.len());
}

#[test]
fn test_hall_of_fame_trims_and_rejects_duplicates() {
    let labeler = RuleLabeler::default();
    let rule = |text: &str| Rule::parse(text, &labeler).unwrap();
    let elite = |text: &str, fitness: f64| EliteRule {
        rule: rule(text),
        fitness,
        generation: 0,
    };

    let mut hof = HallOfFame::new(2);
    assert!(hof.try_add(elite("if SMA(10) > volume then buy", 1.0)));
    assert!(!hof.try_add(elite("if SMA(10) > volume then buy", 9.0)));
    assert!(hof.try_add(elite("if EMA(10) > volume then buy", 3.0)));
    assert!(hof.try_add(elite("if RSI(10) > volume then sell", 2.0)));
    assert!(!hof.try_add(elite("if ATR(10) > volume then sell", 0.5)));

    let fitness: Vec<f64> = hof.get_all().iter().map(|e| e.fitness).collect();
    assert_eq!(fitness, vec![3.0, 2.0]);

    // An evicted rule may come back
    assert!(hof.try_add(elite("if SMA(10) > volume then buy", 5.0)));
    assert_eq!(hof.best().map(|e| e.fitness), Some(5.0));

    let mut disabled = HallOfFame::new(0);
    assert!(!disabled.try_add(elite("if SMA(10) > volume then buy", 1.0)));
    assert!(disabled.is_empty());
}

#[test]
fn test_invalid_config_is_fatal() {
    let mut config = test_config(0, 1);
    assert!(EvolutionEngine::new(&config, length_evaluator()).is_err());

    config.evolution.population_size = 10;
    config.evolution.crossover_rate = 1.5;
    assert!(EvolutionEngine::new(&config, length_evaluator()).is_err());

    config.evolution.crossover_rate = 0.85;
    config.evaluation.num_threads = 0;
    assert!(EvolutionEngine::new(&config, length_evaluator()).is_err());
}
