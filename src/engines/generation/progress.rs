use super::evolution_engine::{GenerationRecord, ProgressCallback};
use crate::engines::generation::rule::Rule;
use crate::error::EvaluationError;
use log::{info, warn};
use std::sync::mpsc::Sender;

/// Logs progress through the `log` facade.
pub struct ConsoleProgressCallback;

impl ProgressCallback for ConsoleProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        info!("Generation {} starting...", generation + 1);
    }

    fn on_individual_evaluated(&mut self, done: usize, total: usize) {
        if done % 10 == 0 || done == total {
            info!("  Evaluated {}/{} rules", done, total);
        }
    }

    fn on_evaluation_failed(&mut self, rule: &Rule, error: &EvaluationError) {
        warn!("Evaluation failed for '{}': {}", rule, error);
    }

    fn on_generation_complete(&mut self, record: &GenerationRecord) {
        match record.best_fitness {
            Some(fitness) => info!(
                "Generation {}: best fitness {:.4} ({} evaluated, {} failed) -> {}",
                record.generation + 1,
                fitness,
                record.evaluated,
                record.failed,
                record.best_rule
            ),
            None => info!(
                "Generation {}: no fitness ({} evaluated, {} failed) -> {}",
                record.generation + 1,
                record.evaluated,
                record.failed,
                record.best_rule
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart(usize),
    IndividualEvaluated { done: usize, total: usize },
    EvaluationFailed { rule: String, error: String },
    GenerationComplete(GenerationRecord),
}

/// Forwards progress to another thread, e.g. a UI or the test harness.
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_individual_evaluated(&mut self, done: usize, total: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::IndividualEvaluated { done, total });
    }

    fn on_evaluation_failed(&mut self, rule: &Rule, error: &EvaluationError) {
        let _ = self.sender.send(ProgressMessage::EvaluationFailed {
            rule: rule.to_rule_string(),
            error: error.to_string(),
        });
    }

    fn on_generation_complete(&mut self, record: &GenerationRecord) {
        let _ = self
            .sender
            .send(ProgressMessage::GenerationComplete(record.clone()));
    }
}
