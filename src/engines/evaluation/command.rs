use super::FitnessEvaluator;
use crate::error::{EvaluationError, RuleforgeError};
use crate::types::FitnessScore;
use log::{debug, warn};
use std::process::{Command, Output};
use std::time::Duration;

/// Scores rules with an external program.
///
/// The rule string is appended as the last argument; the last non-empty line of
/// stdout must be the score (a trailing `%` is accepted).
#[derive(Debug, Clone)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(command: &[String]) -> Result<Self, RuleforgeError> {
        let (program, args) = command.split_first().ok_or_else(|| {
            RuleforgeError::Configuration("Evaluator command is empty".to_string())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl CommandEvaluator {
    fn score(&self, output: Output) -> Result<FitnessScore, EvaluationError> {
        if !output.status.success() {
            return Err(EvaluationError::ExitStatus {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_score(&stdout)
    }

    fn spawn_error(&self, error: std::io::Error) -> EvaluationError {
        EvaluationError::Spawn(format!("{}: {}", self.program, error))
    }
}

impl FitnessEvaluator for CommandEvaluator {
    fn evaluate(&self, rule: &str) -> Result<FitnessScore, EvaluationError> {
        debug!("Running {} for {:?}", self.program, rule);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(rule)
            .output()
            .map_err(|e| self.spawn_error(e))?;
        self.score(output)
    }

    fn enforces_deadline(&self) -> bool {
        true
    }

    /// The child is killed when `limit` passes, so an overrunning backtest
    /// never outlives its evaluation.
    fn evaluate_within(&self, rule: &str, limit: Duration) -> Result<FitnessScore, EvaluationError> {
        debug!("Running {} for {:?} (limit {:?})", self.program, rule, limit);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| self.spawn_error(e))?;

        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args).arg(rule).kill_on_drop(true);

        let output = runtime.block_on(async {
            match tokio::time::timeout(limit, command.output()).await {
                Ok(output) => Some(output),
                // Dropping the pending future kills the child
                Err(_) => None,
            }
        });

        match output {
            Some(output) => self.score(output.map_err(|e| self.spawn_error(e))?),
            None => {
                warn!("{} exceeded {:?}, killed", self.program, limit);
                Err(EvaluationError::TimedOut(limit))
            }
        }
    }
}

pub fn parse_score(stdout: &str) -> Result<FitnessScore, EvaluationError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .ok_or_else(|| EvaluationError::Parse(String::new()))?;

    line.trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .map_err(|_| EvaluationError::Parse(line.to_string()))
}
