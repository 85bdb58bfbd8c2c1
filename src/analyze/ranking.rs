// src/analyze/ranking.rs
//! Scoring pass over a merged result set.
//!
//! Order of operations:
//! 1) rule score for everything; curated entries get `max(rule, floor)`
//! 2) one batched AI call for the non-curated entries; a valid score replaces
//!    the rule score, anything else leaves it untouched
//! 3) sort: score desc, `discovered_at` desc, title asc (case-insensitive)

use metrics::counter;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::analyze::ai_adapter::{AiScorer, ScoreRequest};
use crate::analyze::rules::rule_score;
use crate::config::engine::{EngineConfig, RuleWeights};
use crate::model::{MatchMethod, Opportunity, Profile};

#[derive(Clone, Copy, Debug)]
pub struct ScoringPolicy {
    pub weights: RuleWeights,
    /// Minimum score of a curated entry.
    pub curated_floor: f32,
}

impl ScoringPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            weights: cfg.weights,
            curated_floor: cfg.curated_score_floor,
        }
    }
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Final ordering. Equal scores fall back to recency, then title, then id.
pub fn compare(a: &Opportunity, b: &Opportunity) -> Ordering {
    b.match_score
        .total_cmp(&a.match_score)
        .then_with(|| b.discovered_at.cmp(&a.discovered_at))
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn sort_opportunities(items: &mut [Opportunity]) {
    items.sort_by(compare);
}

fn apply_rule_scores(items: &mut [Opportunity], profile: &Profile, policy: &ScoringPolicy) {
    for o in items.iter_mut() {
        let base = rule_score(profile, o, &policy.weights);
        if o.is_curated() {
            o.match_score = base.max(policy.curated_floor);
        } else {
            o.match_score = base;
            o.match_method = MatchMethod::Rule;
        }
    }
}

/// Returns how many entries were boosted. Never fails.
async fn apply_ai_boost(items: &mut [Opportunity], profile: &Profile, scorer: &dyn AiScorer) -> usize {
    if !scorer.enabled() {
        return 0;
    }
    let candidates: Vec<&Opportunity> = items.iter().filter(|o| !o.is_curated()).collect();
    if candidates.is_empty() {
        return 0;
    }
    let req = ScoreRequest::new(profile, &candidates);

    let scores = match scorer.score(&req).await {
        Ok(s) => s,
        Err(e) => {
            counter!("scoring_ai_fallback_total").increment(1);
            tracing::warn!(
                target: "scoring",
                provider = scorer.provider_name(),
                error = %e,
                "AI boost unavailable; keeping rule scores"
            );
            return 0;
        }
    };

    let by_id: HashMap<&str, f32> = scores
        .iter()
        .filter(|s| s.score.is_finite() && (0.0..=100.0).contains(&s.score))
        .map(|s| (s.id.as_str(), s.score))
        .collect();
    if by_id.len() < scores.len() {
        tracing::debug!(
            target: "scoring",
            rejected = scores.len() - by_id.len(),
            "out-of-range AI scores ignored"
        );
    }

    let mut boosted = 0;
    for o in items.iter_mut().filter(|o| !o.is_curated()) {
        if let Some(&s) = by_id.get(o.id.as_str()) {
            o.match_score = (s * 10.0).round() / 10.0;
            o.match_method = MatchMethod::AiBoosted;
            boosted += 1;
        }
    }
    boosted
}

/// Score and order a merged result set. Returns the ranked list and the
/// number of AI-boosted entries.
pub async fn score_and_rank(
    mut items: Vec<Opportunity>,
    profile: &Profile,
    policy: &ScoringPolicy,
    scorer: &dyn AiScorer,
) -> (Vec<Opportunity>, usize) {
    apply_rule_scores(&mut items, profile, policy);
    let boosted = apply_ai_boost(&mut items, profile, scorer).await;
    sort_opportunities(&mut items);
    (items, boosted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::ai_adapter::{AiScore, DisabledScorer, MockScorer, ScoreFuture};
    use crate::error::ScoringError;
    use chrono::{Duration, TimeZone, Utc};

    fn opp(id: &str, title: &str, tags: &[&str], method: MatchMethod) -> Opportunity {
        Opportunity {
            id: id.into(),
            title: title.into(),
            company: "Acme".into(),
            kind: "internship".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            source_url: "#".into(),
            match_score: 0.0,
            match_method: method,
            discovered_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            source: None,
        }
    }

    fn profile() -> Profile {
        Profile {
            email: "s@kec.edu".into(),
            skills: vec!["backend".into(), "go".into()],
            ..Default::default()
        }
    }

    struct Garbage;

    impl AiScorer for Garbage {
        fn score<'a>(&'a self, req: &'a ScoreRequest) -> ScoreFuture<'a> {
            let out = req
                .candidates
                .iter()
                .map(|c| AiScore { id: c.id.clone(), score: f32::NAN })
                .collect();
            Box::pin(async move { Ok(out) })
        }
        fn provider_name(&self) -> &'static str {
            "garbage"
        }
    }

    /// Valid score for `l1`, out of range for `l2`, plus an id nobody asked about.
    struct Mixed;

    impl AiScorer for Mixed {
        fn score<'a>(&'a self, _req: &'a ScoreRequest) -> ScoreFuture<'a> {
            let out = vec![
                AiScore { id: "l1".into(), score: 88.04 },
                AiScore { id: "l2".into(), score: 150.0 },
                AiScore { id: "zzz".into(), score: 70.0 },
            ];
            Box::pin(async move { Ok(out) })
        }
        fn provider_name(&self) -> &'static str {
            "mixed"
        }
    }

    struct Down;

    impl AiScorer for Down {
        fn score<'a>(&'a self, _req: &'a ScoreRequest) -> ScoreFuture<'a> {
            Box::pin(async { Err(ScoringError::Unavailable("down".into())) })
        }
        fn provider_name(&self) -> &'static str {
            "down"
        }
    }

    #[test]
    fn ties_break_on_recency_then_title() {
        let mut a = opp("a", "beta", &[], MatchMethod::Rule);
        let mut b = opp("b", "Alpha", &[], MatchMethod::Rule);
        let mut c = opp("c", "gamma", &[], MatchMethod::Rule);
        c.discovered_at = c.discovered_at + Duration::seconds(5);
        for o in [&mut a, &mut b, &mut c] {
            o.match_score = 10.0;
        }
        let mut v = vec![a, b, c];
        sort_opportunities(&mut v);
        let ids: Vec<_> = v.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn curated_gets_floor_and_keeps_method() {
        let items = vec![
            opp("c1", "Frontend Intern", &["frontend"], MatchMethod::Curated),
            opp("l1", "SDE Intern", &["backend", "go"], MatchMethod::Rule),
            opp("l2", "Sales Intern", &["sales"], MatchMethod::Rule),
        ];
        let (out, boosted) =
            score_and_rank(items, &profile(), &ScoringPolicy::default(), &DisabledScorer).await;
        assert_eq!(boosted, 0);
        let ids: Vec<_> = out.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["l1", "c1", "l2"]);
        assert_eq!(out[1].match_method, MatchMethod::Curated);
        assert_eq!(out[1].match_score, 40.0);
    }

    #[tokio::test]
    async fn ai_scores_replace_rule_scores_for_live_entries_only() {
        let items = vec![
            opp("c1", "Frontend Intern", &["frontend"], MatchMethod::Curated),
            opp("l1", "SDE Intern", &["backend", "go"], MatchMethod::Rule),
        ];
        let (out, boosted) = score_and_rank(
            items,
            &profile(),
            &ScoringPolicy::default(),
            &MockScorer { boost: 10.0 },
        )
        .await;
        assert_eq!(boosted, 1);
        let live = out.iter().find(|o| o.id == "l1").unwrap();
        assert_eq!(live.match_method, MatchMethod::AiBoosted);
        assert_eq!(live.match_score, 65.0);
        let cur = out.iter().find(|o| o.id == "c1").unwrap();
        assert_eq!(cur.match_method, MatchMethod::Curated);
    }

    #[tokio::test]
    async fn failing_or_malformed_scorer_keeps_rule() {
        for scorer in [&Down as &dyn AiScorer, &Garbage] {
            let items = vec![opp("l1", "SDE Intern", &["backend"], MatchMethod::Rule)];
            let (out, boosted) =
                score_and_rank(items, &profile(), &ScoringPolicy::default(), scorer).await;
            assert_eq!(boosted, 0);
            assert_eq!(out[0].match_method, MatchMethod::Rule);
            assert!((out[0].match_score - 27.5).abs() < 0.01);
        }
    }

    #[tokio::test]
    async fn partially_valid_ai_response_boosts_only_valid_ids() {
        let items = || {
            vec![
                opp("l1", "SDE Intern", &["backend", "go"], MatchMethod::Rule),
                opp("l2", "Sales Intern", &["sales"], MatchMethod::Rule),
            ]
        };
        let (rule_only, _) =
            score_and_rank(items(), &profile(), &ScoringPolicy::default(), &DisabledScorer).await;
        let (out, boosted) =
            score_and_rank(items(), &profile(), &ScoringPolicy::default(), &Mixed).await;

        assert_eq!(boosted, 1);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|o| o.id != "zzz"));

        let l1 = out.iter().find(|o| o.id == "l1").unwrap();
        assert_eq!(l1.match_method, MatchMethod::AiBoosted);
        assert_eq!(l1.match_score, 88.0);

        let l2 = out.iter().find(|o| o.id == "l2").unwrap();
        let l2_rule = rule_only.iter().find(|o| o.id == "l2").unwrap();
        assert_eq!(l2.match_method, MatchMethod::Rule);
        assert_eq!(l2.match_score, l2_rule.match_score);
    }
}
