//! Turns free text like "cierra gmail" into agent ids.
//!
//! Selectors and candidates are normalized the same way (lowercase, accents
//! stripped, punctuation collapsed). Command verbs and articles are dropped
//! from the selector; plural or quantifier words ("all", "todas", "tabs")
//! switch to multi-target mode.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use tabhive_config::ResolverConfig;
use tabhive_core::agent::{AgentContext, AgentId};

/// Lowercase, strip diacritics and collapse every run of non-alphanumeric
/// characters into a single space.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.nfd().filter(|c| !is_combining_mark(*c)) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

fn compact(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// A free-text selector plus the caller's explicit multi-target request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetQuery {
    pub selector: String,
    #[serde(default)]
    pub match_all: bool,
}

impl TargetQuery {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            match_all: false,
        }
    }

    pub fn all(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            match_all: true,
        }
    }
}

/// A scored resolution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetMatch {
    pub agent_id: AgentId,
    pub score: f64,
    pub title: String,
    pub url: String,
}

/// One agent offered to the resolver.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub context: &'a AgentContext,
    pub last_foregrounded_at: Option<i64>,
}

/// A selector after normalization and filler removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSelector {
    pub phrase: String,
    pub tokens: Vec<String>,
    pub group_hint: bool,
}

impl ParsedSelector {
    pub fn is_empty(&self) -> bool {
        self.phrase.is_empty()
    }
}

/// Scores agents against free-text selectors.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    config: ResolverConfig,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new(ResolverConfig::default())
    }
}

impl TargetResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let mut config = config;
        config.filler_words = config.filler_words.iter().map(|w| normalize(w)).collect();
        config.group_hints = config.group_hints.iter().map(|w| normalize(w)).collect();
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn parse(&self, selector: &str) -> ParsedSelector {
        let normalized = normalize(selector);
        let mut group_hint = false;
        let mut tokens = Vec::new();
        for word in normalized.split(' ').filter(|w| !w.is_empty()) {
            if self.config.group_hints.iter().any(|h| h == word) {
                group_hint = true;
            } else if !self.config.filler_words.iter().any(|f| f == word) {
                tokens.push(word.to_string());
            }
        }
        ParsedSelector {
            phrase: tokens.join(" "),
            tokens,
            group_hint,
        }
    }

    /// Score one agent. Zero means no evidence at all.
    pub fn score(&self, selector: &ParsedSelector, context: &AgentContext) -> f64 {
        if selector.is_empty() {
            return 0.0;
        }
        let haystacks = [normalize(&context.title), normalize(&context.host())];

        let mut score = 0.0;
        if haystacks.iter().any(|h| h.contains(&selector.phrase)) {
            score += self.config.exact_weight;
        } else {
            let phrase = compact(&selector.phrase);
            if haystacks.iter().any(|h| compact(h).contains(&phrase)) {
                score += self.config.compact_weight;
            }
        }

        let matched = selector
            .tokens
            .iter()
            .filter(|token| haystacks.iter().any(|h| h.contains(token.as_str())))
            .count();
        score += matched as f64 * self.config.token_weight;
        if selector.tokens.len() > 1 && matched == selector.tokens.len() {
            score += self.config.all_tokens_bonus;
        }
        score
    }

    /// Resolve a query against live agents.
    ///
    /// Single-target mode returns the best match (ties go to the most
    /// recently foregrounded agent). Multi-target mode returns every agent
    /// at or above the floor, best first.
    pub fn resolve(&self, query: &TargetQuery, candidates: &[Candidate<'_>]) -> Vec<TargetMatch> {
        let selector = self.parse(&query.selector);
        let mut scored: Vec<(f64, Option<i64>, &AgentContext)> = candidates
            .iter()
            .map(|c| (self.score(&selector, c.context), c.last_foregrounded_at, c.context))
            .filter(|(score, _, _)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| b.1.cmp(&a.1))
                .then_with(|| a.2.agent_id.cmp(&b.2.agent_id))
        });

        let multi = query.match_all || selector.group_hint;
        if multi {
            scored.retain(|(score, _, _)| *score >= self.config.floor);
        } else {
            scored.truncate(1);
        }

        tracing::debug!(
            selector = %query.selector,
            phrase = %selector.phrase,
            multi,
            matches = scored.len(),
            "Resolved targets"
        );

        scored
            .into_iter()
            .map(|(score, _, ctx)| TargetMatch {
                agent_id: ctx.agent_id.clone(),
                score,
                title: ctx.title.clone(),
                url: ctx.url.clone(),
            })
            .collect()
    }
}
