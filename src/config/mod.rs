pub mod traits;
pub mod grammar;
pub mod evolution;
pub mod evaluation;
pub mod manager;

pub use manager::{AppConfig, ConfigManager};
pub use grammar::{GrammarConfig, IndicatorFamily};
pub use evolution::{EliteSelection, EvolutionConfig};
pub use evaluation::EvaluationConfig;
pub use traits::ConfigSection;
