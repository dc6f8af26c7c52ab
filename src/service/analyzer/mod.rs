//! Rule-based SEO scoring.
//!
//! A `SeoAnalyzer` holds an ordered list of `SeoRule`s. Every rule scores
//! the page independently; the analyzer sums the scores, normalizes them to
//! 0-100 and concatenates the issues in rule order.

pub mod rules;

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::models::{PageSignals, RuleResult, ScoreResult};

/// Normalized score ceiling
pub const SCORE_SCALE: u8 = 100;

/// One independently scored check.
#[derive(Clone)]
pub struct SeoRule {
    pub name: &'static str,
    pub max_score: u32,
    pub evaluate: fn(&PageSignals) -> RuleResult,
}

impl SeoRule {
    pub const fn new(name: &'static str, max_score: u32, evaluate: fn(&PageSignals) -> RuleResult) -> Self {
        Self {
            name,
            max_score,
            evaluate,
        }
    }
}

impl fmt::Debug for SeoRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeoRule")
            .field("name", &self.name)
            .field("max_score", &self.max_score)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SeoAnalyzer {
    rules: Vec<SeoRule>,
}

impl Default for SeoAnalyzer {
    fn default() -> Self {
        Self::with_rules(default_rules())
    }
}

/// Title, meta description, headings, image alt text, performance.
pub fn default_rules() -> Vec<SeoRule> {
    vec![
        SeoRule::new("Title Tag", rules::TITLE_MAX_SCORE, rules::title_tag),
        SeoRule::new(
            "Meta Description",
            rules::META_DESCRIPTION_MAX_SCORE,
            rules::meta_description,
        ),
        SeoRule::new("Heading Tags", rules::HEADINGS_MAX_SCORE, rules::heading_tags),
        SeoRule::new("Image Alt Tags", rules::IMAGE_ALT_MAX_SCORE, rules::image_alt_tags),
        SeoRule::new(
            "Page Performance",
            rules::PERFORMANCE_MAX_SCORE,
            rules::page_performance,
        ),
    ]
}

impl SeoAnalyzer {
    pub fn with_rules(rules: Vec<SeoRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SeoRule] {
        &self.rules
    }

    /// Score a page. Pure and deterministic.
    pub fn analyze(&self, signals: &PageSignals) -> ScoreResult {
        let mut total_score: u64 = 0;
        let mut total_max: u64 = 0;
        let mut issues = Vec::new();
        let mut rule_results = BTreeMap::new();

        for rule in &self.rules {
            let mut result = (rule.evaluate)(signals);
            // The declared weight is authoritative.
            result.max_score = rule.max_score;
            result.score = result.score.min(rule.max_score);

            total_score += u64::from(result.score);
            total_max += u64::from(result.max_score);
            issues.extend(result.issues.iter().cloned());
            rule_results.insert(rule.name.to_string(), result);
        }

        ScoreResult {
            seo_score: normalize(total_score, total_max),
            max_score: SCORE_SCALE,
            issues,
            rule_results,
        }
    }
}

/// `round_half_up(100 * score / max)`; zero when there is nothing to score.
fn normalize(score: u64, max: u64) -> u8 {
    if max == 0 {
        return 0;
    }
    let ratio = score.min(max) as f64 / max as f64;
    (ratio * f64::from(SCORE_SCALE)).round() as u8
}
