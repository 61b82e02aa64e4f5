use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleforgeError {
    #[error("Grammar did not terminate: {symbol} still unexpanded after {steps} substitutions")]
    GrammarNonTerminating { symbol: String, steps: usize },

    #[error("Undefined grammar symbol: {0}")]
    UndefinedSymbol(String),

    #[error("Invalid rule structure: {0}")]
    InvalidRuleStructure(String),

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config source error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure of a single fitness evaluation. Isolated to one individual.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("{0}")]
    Failed(String),

    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("evaluator returned a non-finite score: {0}")]
    NonFinite(f64),

    #[error("unknown indicator reading: {0}")]
    UnknownIndicator(String),

    #[error("unknown value field: {0}")]
    UnknownField(String),

    #[error("failed to spawn evaluator process: {0}")]
    Spawn(String),

    #[error("evaluator process exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("could not parse evaluator output {0:?} as a score")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, RuleforgeError>;
