use crate::config::{ConfigSection, GrammarConfig};
use crate::error::RuleforgeError;
use std::collections::BTreeMap;

pub const START_SYMBOL: &str = "<rule>";
pub const DEFAULT_MAX_EXPANSION_STEPS: usize = 256;

/// Context-free grammar: non-terminal symbol -> ordered expansion alternatives.
///
/// Symbols are written `<name>`. Only the grammar's own symbols count as
/// non-terminals, so operator terminals such as `<` and `<=` are left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct Grammar {
    start: String,
    productions: BTreeMap<String, Vec<String>>,
    max_expansion_steps: usize,
}

impl Grammar {
    pub fn new(
        start: &str,
        productions: BTreeMap<String, Vec<String>>,
    ) -> Result<Self, RuleforgeError> {
        if productions.is_empty() {
            return Err(RuleforgeError::Configuration("Grammar is empty".to_string()));
        }
        for (symbol, alternatives) in &productions {
            if !is_symbol(symbol) {
                return Err(RuleforgeError::Configuration(format!(
                    "Grammar symbol {:?} must look like <name>",
                    symbol
                )));
            }
            if alternatives.is_empty() {
                return Err(RuleforgeError::Configuration(format!(
                    "Grammar symbol {} has no alternatives",
                    symbol
                )));
            }
        }
        if !productions.contains_key(start) {
            return Err(RuleforgeError::UndefinedSymbol(start.to_string()));
        }

        Ok(Self {
            start: start.to_string(),
            productions,
            max_expansion_steps: DEFAULT_MAX_EXPANSION_STEPS,
        })
    }

    /// Builds the trading-rule grammar described by `config`
    pub fn from_config(config: &GrammarConfig) -> Result<Self, RuleforgeError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &GrammarConfig) -> Self {
        let clause = "<indicator> <operator> <value>";
        let joiner = format!(" {} ", config.joiner());
        let conditions = config
            .clause_counts
            .iter()
            .map(|&count| vec![clause; count].join(joiner.as_str()))
            .collect();

        let mut productions = BTreeMap::new();
        productions.insert(
            START_SYMBOL.to_string(),
            vec!["if <condition> then <action>".to_string()],
        );
        productions.insert("<condition>".to_string(), conditions);
        productions.insert("<operator>".to_string(), config.operators.clone());
        productions.insert("<indicator>".to_string(), config.indicator_tokens());
        productions.insert("<value>".to_string(), config.value_fields.clone());
        productions.insert("<action>".to_string(), config.actions.clone());

        Self {
            start: START_SYMBOL.to_string(),
            productions,
            max_expansion_steps: config.max_expansion_steps,
        }
    }

    pub fn with_max_expansion_steps(mut self, steps: usize) -> Self {
        self.max_expansion_steps = steps;
        self
    }

    pub fn start_symbol(&self) -> &str {
        &self.start
    }

    pub fn max_expansion_steps(&self) -> usize {
        self.max_expansion_steps
    }

    pub fn alternatives(&self, symbol: &str) -> Option<&[String]> {
        self.productions.get(symbol).map(Vec::as_slice)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.productions.keys().map(String::as_str)
    }

    /// Leftmost occurrence of any non-terminal in `text`
    pub fn leftmost_non_terminal<'a>(&'a self, text: &str) -> Option<(usize, &'a str)> {
        self.symbols()
            .filter_map(|symbol| text.find(symbol).map(|pos| (pos, symbol)))
            .min_by_key(|(pos, _)| *pos)
    }

    pub fn is_terminal(&self, text: &str) -> bool {
        self.leftmost_non_terminal(text).is_none()
    }
}

/// The shipped grammar, built from the default configuration
pub fn get_grammar() -> Grammar {
    Grammar::build(&GrammarConfig::default())
}

fn is_symbol(symbol: &str) -> bool {
    symbol.len() > 2
        && symbol.starts_with('<')
        && symbol.ends_with('>')
        && !symbol[1..symbol.len() - 1].contains(|c: char| c == '<' || c == '>' || c.is_whitespace())
}
