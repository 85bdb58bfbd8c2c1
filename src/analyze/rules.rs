// src/analyze/rules.rs
//! Rule-based base score: weighted overlap between the profile and an
//! opportunity. Pure and deterministic; result in `[0, 100]`.
//!
//! Signals, each in `[0, 1]`:
//! - `tag_overlap`   : share of profile tags present in the opportunity tags
//!   (near-spellings such as "javascript"/"java script" count half)
//! - `title_match`   : share of profile tags appearing in the title
//! - `role_match`    : department or role mentioned in title, tags or type
//! - `company_match` : a profile tag appears in the company name
//!
//! Base = 100 * Σ wᵢ·sᵢ / Σ wᵢ, rounded to one decimal.

use std::collections::BTreeSet;
use strsim::normalized_levenshtein;

use crate::config::engine::RuleWeights;
use crate::model::{Opportunity, Profile};

const FUZZY_MIN_SIMILARITY: f64 = 0.85;
const FUZZY_MIN_LEN: usize = 4;

/// Per-signal breakdown, kept for diagnostics and tests.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RuleSignals {
    pub tag_overlap: f32,
    pub title_match: f32,
    pub role_match: f32,
    pub company_match: f32,
}

/// Lowercase words padded with spaces, so `contains(" go ")` is a word match.
fn padded_words(s: &str) -> String {
    let mut out = String::from(" ");
    for ch in s.to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '+' || ch == '#' {
            out.push(ch);
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    if !out.ends_with(' ') {
        out.push(' ');
    }
    out
}

fn mentions(haystack_padded: &str, needle: &str) -> bool {
    let n = padded_words(needle);
    !n.trim().is_empty() && haystack_padded.contains(&n)
}

fn tag_credit(tag: &str, opp_tags: &BTreeSet<String>) -> f32 {
    if opp_tags.contains(tag) {
        return 1.0;
    }
    if tag.chars().count() >= FUZZY_MIN_LEN
        && opp_tags.iter().any(|t| {
            t.chars().count() >= FUZZY_MIN_LEN && normalized_levenshtein(tag, t) >= FUZZY_MIN_SIMILARITY
        })
    {
        return 0.5;
    }
    0.0
}

pub fn signals(profile: &Profile, opp: &Opportunity) -> RuleSignals {
    let ptags = profile.tags();
    let title = padded_words(&opp.title);
    let company = padded_words(&opp.company);

    let (tag_overlap, title_match, company_match) = if ptags.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        let n = ptags.len() as f32;
        let tag_sum: f32 = ptags.iter().map(|t| tag_credit(t, &opp.tags)).sum();
        let title_hits = ptags.iter().filter(|t| mentions(&title, t)).count() as f32;
        let company_hit = ptags.iter().any(|t| mentions(&company, t));
        (tag_sum / n, title_hits / n, if company_hit { 1.0 } else { 0.0 })
    };

    let context = padded_words(&format!(
        "{} {} {}",
        opp.title,
        opp.kind,
        opp.tags.iter().cloned().collect::<Vec<_>>().join(" ")
    ));
    let role_match = [&profile.department, &profile.role]
        .iter()
        .any(|s| mentions(&context, s));

    RuleSignals {
        tag_overlap,
        title_match,
        role_match: if role_match { 1.0 } else { 0.0 },
        company_match,
    }
}

pub fn combine(s: &RuleSignals, w: &RuleWeights) -> f32 {
    let raw = s.tag_overlap * w.tag_overlap
        + s.title_match * w.title_match
        + s.role_match * w.role_match
        + s.company_match * w.company_match;
    let denom = (w.tag_overlap + w.title_match + w.role_match + w.company_match).max(1e-6);
    let score = (raw / denom).clamp(0.0, 1.0) * 100.0;
    (score * 10.0).round() / 10.0
}

/// Rule-based score of `opp` for `profile`, in `[0, 100]`.
pub fn rule_score(profile: &Profile, opp: &Opportunity, w: &RuleWeights) -> f32 {
    combine(&signals(profile, opp), w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MatchMethod;
    use chrono::Utc;

    fn opp(title: &str, company: &str, tags: &[&str]) -> Opportunity {
        Opportunity {
            id: "x".into(),
            title: title.into(),
            company: company.into(),
            kind: "internship".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            source_url: "#".into(),
            match_score: 0.0,
            match_method: MatchMethod::Rule,
            discovered_at: Utc::now(),
            source: None,
        }
    }

    fn profile(tags: &[&str]) -> Profile {
        Profile {
            email: "s@kec.edu".into(),
            skills: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn full_tag_overlap_beats_none() {
        let p = profile(&["backend", "go"]);
        let w = RuleWeights::default();
        let hit = rule_score(&p, &opp("SDE Intern", "Acme", &["backend", "go"]), &w);
        let miss = rule_score(&p, &opp("Designer", "Acme", &["frontend"]), &w);
        assert!(hit > miss, "{hit} vs {miss}");
        assert_eq!(miss, 0.0);
        assert!((hit - 55.0).abs() < 0.01);
    }

    #[test]
    fn title_words_match_whole_words_only() {
        let p = profile(&["go"]);
        let s = signals(&p, &opp("Go Developer Intern", "Acme", &[]));
        assert_eq!(s.title_match, 1.0);
        let s = signals(&p, &opp("Google Cloud Intern", "Acme", &[]));
        assert_eq!(s.title_match, 0.0);
    }

    #[test]
    fn near_spelling_gets_half_credit() {
        let p = profile(&["javascript"]);
        let s = signals(&p, &opp("Web Intern", "Acme", &["java script"]));
        assert_eq!(s.tag_overlap, 0.5);
    }

    #[test]
    fn department_in_tags_counts_as_role_match() {
        let p = Profile {
            email: "s@kec.edu".into(),
            department: "ECE".into(),
            ..Default::default()
        };
        let s = signals(&p, &opp("Embedded Intern", "Acme", &["ece", "embedded"]));
        assert_eq!(s.role_match, 1.0);
    }

    #[test]
    fn score_is_bounded_and_deterministic() {
        let p = profile(&["rust", "acme"]);
        let o = opp("Rust Intern", "Acme", &["rust"]);
        let w = RuleWeights::default();
        let a = rule_score(&p, &o, &w);
        assert_eq!(a, rule_score(&p, &o, &w));
        assert!((0.0..=100.0).contains(&a));
    }
}
