// src/analyze/mod.rs
//! Matching pipeline: rule scores, optional AI boost, final ordering.

pub mod ai_adapter;
pub mod ranking;
pub mod rules;

pub use crate::analyze::ai_adapter::{AiScorer, DynAiScorer};
pub use crate::analyze::ranking::{score_and_rank, sort_opportunities, ScoringPolicy};
pub use crate::analyze::rules::{rule_score, RuleSignals};
