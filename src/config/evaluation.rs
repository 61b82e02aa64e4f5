use super::traits::{ConfigManifest, ConfigSection, FieldManifest};
use crate::error::RuleforgeError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub num_threads: usize,
    pub timeout_secs: Option<u64>,
    /// External evaluator program followed by its leading arguments
    pub command: Vec<String>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout_secs: None,
            command: Vec::new(),
        }
    }
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl ConfigSection for EvaluationConfig {
    fn section_name() -> &'static str {
        "evaluation"
    }

    fn validate(&self) -> Result<(), RuleforgeError> {
        if self.num_threads == 0 {
            return Err(RuleforgeError::Configuration(
                "Evaluation needs at least one thread".to_string(),
            ));
        }
        if self.timeout_secs == Some(0) {
            return Err(RuleforgeError::Configuration(
                "Evaluation timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn to_manifest(&self) -> ConfigManifest {
        ConfigManifest {
            section: "Evaluation".to_string(),
            fields: vec![
                FieldManifest::new(
                    "num_threads",
                    "integer",
                    json!(Self::default().num_threads),
                    "Worker threads evaluating one generation",
                )
                .bounded(1.0, 1024.0),
                FieldManifest::new(
                    "timeout_secs",
                    "integer?",
                    serde_json::Value::Null,
                    "Per-rule evaluation timeout; unbounded when absent",
                ),
                FieldManifest::new(
                    "command",
                    "list<string>",
                    json!([]),
                    "External evaluator; the rule string is appended as last argument",
                ),
            ],
        }
    }
}
