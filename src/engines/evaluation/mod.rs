pub mod command;
pub mod expression;

pub use command::{parse_score, CommandEvaluator};
pub use expression::{
    Bar, Comparison, Condition, IndicatorRef, MarketSnapshot, Operand, RuleExpr, ValueField,
};

use crate::error::EvaluationError;
use crate::types::FitnessScore;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

/// Scores one rule string against a fixed historical dataset.
///
/// Implementations hold their own read-only data (usually behind an `Arc`) and
/// are called concurrently from the evaluation pool.
pub trait FitnessEvaluator: Send + Sync {
    fn evaluate(&self, rule: &str) -> Result<FitnessScore, EvaluationError>;

    /// True when `evaluate_within` stops its own work at the deadline.
    fn enforces_deadline(&self) -> bool {
        false
    }

    /// Scores with a deadline. Evaluators that return true from
    /// `enforces_deadline` must release everything they started once `limit`
    /// passes and report `TimedOut`.
    fn evaluate_within(&self, rule: &str, _limit: Duration) -> Result<FitnessScore, EvaluationError> {
        self.evaluate(rule)
    }
}

impl<F> FitnessEvaluator for F
where
    F: Fn(&str) -> Result<FitnessScore, EvaluationError> + Send + Sync,
{
    fn evaluate(&self, rule: &str) -> Result<FitnessScore, EvaluationError> {
        self(rule)
    }
}

/// Runs the evaluator, turning panics, non-finite scores and (optionally)
/// overruns into `EvaluationError`s.
///
/// Evaluators that enforce their own deadline run on the calling thread. Any
/// other evaluator runs on a helper thread per call; on timeout that thread is
/// left to finish in the background and its result is discarded.
pub fn evaluate_with_timeout(
    evaluator: &Arc<dyn FitnessEvaluator>,
    rule: &str,
    timeout: Option<Duration>,
) -> Result<FitnessScore, EvaluationError> {
    let score = match timeout {
        None => guarded(|| evaluator.evaluate(rule))?,
        Some(limit) if evaluator.enforces_deadline() => {
            guarded(|| evaluator.evaluate_within(rule, limit))?
        }
        Some(limit) => on_helper_thread(evaluator, rule, limit)?,
    };

    if score.is_finite() {
        Ok(score)
    } else {
        Err(EvaluationError::NonFinite(score))
    }
}

fn on_helper_thread(
    evaluator: &Arc<dyn FitnessEvaluator>,
    rule: &str,
    limit: Duration,
) -> Result<FitnessScore, EvaluationError> {
    let (tx, rx) = mpsc::channel();
    let evaluator = Arc::clone(evaluator);
    let rule = rule.to_string();
    thread::Builder::new()
        .name("rule-evaluator".to_string())
        .spawn(move || {
            let _ = tx.send(guarded(|| evaluator.evaluate(&rule)));
        })
        .map_err(|e| EvaluationError::Spawn(e.to_string()))?;

    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(EvaluationError::TimedOut(limit)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(EvaluationError::Failed(
            "evaluator thread exited without a result".to_string(),
        )),
    }
}

fn guarded<F>(evaluate: F) -> Result<FitnessScore, EvaluationError>
where
    F: FnOnce() -> Result<FitnessScore, EvaluationError>,
{
    panic::catch_unwind(AssertUnwindSafe(evaluate))
        .unwrap_or_else(|_| Err(EvaluationError::Failed("evaluator panicked".to_string())))
}
