pub mod grammar;
pub mod generator;
pub mod labeler;
pub mod rule;
pub mod operators;
pub mod population;
pub mod hall_of_fame;
pub mod evolution_engine;
pub mod progress;

pub use grammar::{get_grammar, Grammar};
pub use generator::{generate_rule, RuleGenerator};
pub use labeler::{validate, RuleLabeler};
pub use rule::Rule;
pub use operators::{crossover, crossover_rule_strings, mutate, select_parents};
pub use population::{Individual, Population};
pub use hall_of_fame::{EliteRule, HallOfFame};
pub use evolution_engine::{
    CancellationToken, EvaluationStats, EvolutionEngine, EvolutionOutcome, GenerationRecord,
    ProgressCallback, Termination,
};
pub use progress::{ChannelProgressCallback, ConsoleProgressCallback, ProgressMessage};
