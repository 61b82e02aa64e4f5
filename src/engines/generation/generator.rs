use crate::config::GrammarConfig;
use crate::engines::generation::{
    grammar::Grammar,
    labeler::RuleLabeler,
    rule::Rule,
};
use crate::error::RuleforgeError;
use log::debug;
use rand::seq::SliceRandom;
use rand::Rng;

/// Expands the start symbol into a fully terminal rule string.
///
/// Each step substitutes the leftmost remaining non-terminal with one of its
/// alternatives, chosen uniformly. Fails once `grammar.max_expansion_steps()`
/// substitutions have not produced a terminal string.
pub fn generate_rule<R: Rng>(
    grammar: &Grammar,
    rng: &mut R,
) -> Result<String, RuleforgeError> {
    let mut working = choose(grammar, grammar.start_symbol(), rng)?.to_string();
    let mut steps = 0;

    while let Some((pos, symbol)) = grammar.leftmost_non_terminal(&working) {
        if steps >= grammar.max_expansion_steps() {
            return Err(RuleforgeError::GrammarNonTerminating {
                symbol: symbol.to_string(),
                steps,
            });
        }
        let replacement = choose(grammar, symbol, rng)?;
        working.replace_range(pos..pos + symbol.len(), replacement);
        steps += 1;
    }

    debug!("Derived {:?} in {} substitutions", working, steps);
    Ok(working)
}

fn choose<'g, R: Rng>(
    grammar: &'g Grammar,
    symbol: &str,
    rng: &mut R,
) -> Result<&'g str, RuleforgeError> {
    grammar
        .alternatives(symbol)
        .and_then(|alternatives| alternatives.choose(rng))
        .map(String::as_str)
        .ok_or_else(|| RuleforgeError::UndefinedSymbol(symbol.to_string()))
}

/// Produces typed rules from a grammar
#[derive(Debug, Clone)]
pub struct RuleGenerator {
    grammar: Grammar,
    labeler: RuleLabeler,
}

impl RuleGenerator {
    pub fn new(grammar: Grammar, labeler: RuleLabeler) -> Self {
        Self { grammar, labeler }
    }

    pub fn from_config(config: &GrammarConfig) -> Result<Self, RuleforgeError> {
        Ok(Self::new(Grammar::from_config(config)?, RuleLabeler::new(config)))
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn labeler(&self) -> &RuleLabeler {
        &self.labeler
    }

    /// Derives a rule and labels it once. A grammar whose derivations do not
    /// label into a valid shape yields `InvalidRuleStructure`.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Result<Rule, RuleforgeError> {
        let text = generate_rule(&self.grammar, rng)?;
        Rule::parse(&text, &self.labeler)
    }
}
