//! The default rubric. Each rule looks at one aspect of the page and never
//! sees the others.

use crate::domain::models::{PageSignals, RuleResult};

// Title window in characters
const TITLE_MIN_CHARS: usize = 50;
const TITLE_MAX_CHARS: usize = 60;
// Meta description window in characters
const META_MIN_CHARS: usize = 150;
const META_MAX_CHARS: usize = 160;

pub const TITLE_MAX_SCORE: u32 = 15;
pub const META_DESCRIPTION_MAX_SCORE: u32 = 15;
pub const HEADINGS_MAX_SCORE: u32 = 20;
pub const IMAGE_ALT_MAX_SCORE: u32 = 15;
pub const PERFORMANCE_MAX_SCORE: u32 = 35;

/// Shared shape of the title and meta description checks: presence earns
/// 10 points, a length inside the window earns the remaining 5.
fn length_window(
    value: Option<&str>,
    max_score: u32,
    label: &str,
    missing: &str,
    window: (usize, usize),
) -> RuleResult {
    let Some(text) = value else {
        return RuleResult::new(0, max_score, vec![missing.to_string()]);
    };

    let mut score = 10;
    let mut issues = Vec::new();
    let length = text.chars().count();
    let (min, max) = window;

    if length < min {
        issues.push(format!(
            "{} is too short ({} chars). Recommended: {}-{} chars",
            label, length, min, max
        ));
    } else if length > max {
        issues.push(format!(
            "{} is too long ({} chars). Recommended: {}-{} chars",
            label, length, min, max
        ));
    } else {
        score += 5;
    }

    RuleResult::new(score, max_score, issues)
}

pub fn title_tag(signals: &PageSignals) -> RuleResult {
    length_window(
        signals.title(),
        TITLE_MAX_SCORE,
        "Title",
        "Missing title tag",
        (TITLE_MIN_CHARS, TITLE_MAX_CHARS),
    )
}

pub fn meta_description(signals: &PageSignals) -> RuleResult {
    length_window(
        signals.meta_description(),
        META_DESCRIPTION_MAX_SCORE,
        "Meta description",
        "Missing meta description",
        (META_MIN_CHARS, META_MAX_CHARS),
    )
}

pub fn heading_tags(signals: &PageSignals) -> RuleResult {
    let mut score = 0;
    let mut issues = Vec::new();

    match signals.h1_tags().len() {
        0 => issues.push("Missing H1 tag".to_string()),
        1 => score += 15,
        n => {
            score += 10;
            issues.push(format!(
                "Multiple H1 tags found ({}). Should have exactly one H1 tag",
                n
            ));
        }
    }

    if signals.h2_tags().is_empty() {
        issues.push("No H2 tags found. Consider adding subheadings for better structure".to_string());
    } else {
        score += 5;
    }

    RuleResult::new(score, HEADINGS_MAX_SCORE, issues)
}

pub fn image_alt_tags(signals: &PageSignals) -> RuleResult {
    let total = signals.images_total();
    if total == 0 {
        return RuleResult::new(IMAGE_ALT_MAX_SCORE, IMAGE_ALT_MAX_SCORE, Vec::new());
    }

    let missing = signals.images_without_alt();
    let percent_with_alt = f64::from(total - missing) / f64::from(total) * 100.0;
    let missing_issue = format!("{} image(s) missing alt tags", missing);

    let (score, issue) = if percent_with_alt >= 100.0 {
        (IMAGE_ALT_MAX_SCORE, None)
    } else if percent_with_alt >= 80.0 {
        (12, Some(missing_issue))
    } else if percent_with_alt >= 60.0 {
        (9, Some(missing_issue))
    } else if percent_with_alt >= 40.0 {
        (6, Some(missing_issue))
    } else {
        (
            3,
            Some(format!(
                "{}. This significantly impacts accessibility and SEO",
                missing_issue
            )),
        )
    };

    RuleResult::new(score, IMAGE_ALT_MAX_SCORE, issue.into_iter().collect())
}

pub fn page_performance(signals: &PageSignals) -> RuleResult {
    let seconds = signals.page_load_time_ms() as f64 / 1000.0;
    let headline = format!("Page load time is {:.2}s", seconds);

    let (score, issue) = if seconds < 2.0 {
        (PERFORMANCE_MAX_SCORE, None)
    } else if seconds < 3.0 {
        (25, Some(format!("{}. Aim for under 2s for optimal performance", headline)))
    } else if seconds < 5.0 {
        (15, Some(format!("{}. This may negatively impact user experience", headline)))
    } else {
        (5, Some(format!("{}. This is too slow and will hurt SEO rankings", headline)))
    };

    RuleResult::new(score, PERFORMANCE_MAX_SCORE, issue.into_iter().collect())
}
