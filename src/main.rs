use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::{info, warn, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ruleforge::config::ConfigManager;
use ruleforge::engines::evaluation::CommandEvaluator;
use ruleforge::engines::generation::{
    validate, CancellationToken, ConsoleProgressCallback, EliteRule, EvolutionEngine,
    RuleGenerator, RuleLabeler, Termination,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about = "Evolves trading rules from a grammar.")]
struct Cli {
    /// TOML file layered over the built-in defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log ruleforge internals at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Prints freshly generated rules.
    Generate {
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Labels a rule string and checks its structure.
    Validate {
        /// e.g. "if SMA(10) > closing_price and RSI(20) <= volume then buy"
        rule: String,
    },

    /// Runs the evolution loop, scoring rules with an external command.
    ///
    /// The command receives the rule as its last argument and must print the
    /// score on its last line of output.
    Evolve {
        #[arg(long)]
        seed: Option<u64>,

        #[arg(long)]
        generations: Option<usize>,

        #[arg(long)]
        population: Option<usize>,

        /// Write the run report (hall of fame, final population) as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Evaluator program and arguments, after `--`.
        #[arg(last = true)]
        evaluator: Vec<String>,
    },

    /// Prints the effective configuration as TOML.
    Config {
        /// Print the field manifest as JSON instead.
        #[arg(long)]
        manifest: bool,

        /// Write the configuration to this file instead of printing it.
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct RunReport<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    termination: Termination,
    generations_completed: usize,
    seed: Option<u64>,
    hall_of_fame: &'a [EliteRule],
    final_population: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut manager = ConfigManager::load(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Commands::Generate { count, seed } => {
            let generator = RuleGenerator::from_config(&manager.get().grammar)?;
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            for _ in 0..count {
                println!("{}", generator.generate(&mut rng)?);
            }
        }
        Commands::Validate { rule } => {
            let labeler = RuleLabeler::new(&manager.get().grammar);
            let components = labeler.label(&rule);
            for component in &components {
                println!("{:<10} {}", component.kind, component.token);
            }
            if !validate(&components) {
                bail!("Invalid rule structure: {:?}", rule);
            }
            println!("valid");
        }
        Commands::Evolve {
            seed,
            generations,
            population,
            output,
            evaluator,
        } => {
            manager.update(|config| {
                if seed.is_some() {
                    config.evolution.seed = seed;
                }
                if let Some(generations) = generations {
                    config.evolution.generations = generations;
                }
                if let Some(population) = population {
                    config.evolution.population_size = population;
                }
                if !evaluator.is_empty() {
                    config.evaluation.command = evaluator;
                }
            })?;
            run_evolution(&manager, output)?;
        }
        Commands::Config { manifest, write } => {
            if let Some(path) = write {
                manager.save_to_file(&path)?;
                info!("Configuration written to {}", path.display());
            } else if manifest {
                println!("{}", serde_json::to_string_pretty(&manager.manifest())?);
            } else {
                print!("{}", manager.to_toml()?);
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_module("ruleforge", LevelFilter::Debug);
    }
    builder.init();
}

fn run_evolution(manager: &ConfigManager, output: Option<PathBuf>) -> Result<()> {
    let config = manager.get();
    let evaluator = CommandEvaluator::new(&config.evaluation.command).context(
        "No evaluator command: pass it after `--` or set evaluation.command in the config",
    )?;
    info!("Scoring rules with {}", evaluator.program());

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone())?;

    let mut engine =
        EvolutionEngine::new(config, Arc::new(evaluator))?.with_cancellation(cancel);

    let started_at = Utc::now();
    let outcome = engine.run(ConsoleProgressCallback)?;
    let finished_at = Utc::now();

    if outcome.termination == Termination::Interrupted {
        warn!(
            "Interrupted after {} completed generations",
            outcome.generations_completed
        );
    }

    println!("Hall of fame:");
    for (rank, elite) in outcome.hall_of_fame.iter().enumerate() {
        println!(
            "{:>3}. {:>10.4}  (gen {:>3})  {}",
            rank + 1,
            elite.fitness,
            elite.generation + 1,
            elite.rule
        );
    }

    if let Some(path) = output {
        let report = RunReport {
            started_at,
            finished_at,
            termination: outcome.termination,
            generations_completed: outcome.generations_completed,
            seed: config.evolution.seed,
            hall_of_fame: &outcome.hall_of_fame,
            final_population: outcome
                .population
                .iter()
                .map(|individual| individual.rule.to_rule_string())
                .collect(),
        };
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Run report written to {}", path.display());
    }

    Ok(())
}

/// First Ctrl-C stops the run at the next check; a second one exits.
fn spawn_interrupt_handler(cancel: CancellationToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                warn!("Interrupt received, stopping after in-flight evaluations");
                cancel.cancel();

                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            });
        })?;

    Ok(())
}
