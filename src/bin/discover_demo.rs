//! Demo that runs one discovery against the bundled fixture feeds (no network).

use std::sync::Arc;

use opportunity_engine::ai_adapter::MockScorer;
use opportunity_engine::catalog::{CuratedEntry, StaticCatalog};
use opportunity_engine::config::engine::EngineConfig;
use opportunity_engine::ingest::providers::{json_board::JsonBoardConnector, rss_feed::RssFeedConnector};
use opportunity_engine::ingest::types::DynConnector;
use opportunity_engine::{Engine, Profile, Trigger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let connectors: Vec<DynConnector> = vec![
        Arc::new(RssFeedConnector::from_fixture(
            "fixture-rss",
            include_str!("../../tests/fixtures/jobs_rss.xml"),
        )),
        Arc::new(JsonBoardConnector::from_fixture(
            "fixture-board",
            include_str!("../../tests/fixtures/jobs_board.json"),
        )),
    ];
    let engine = Engine::new(
        &EngineConfig::default(),
        connectors,
        Arc::new(MockScorer { boost: 5.0 }),
    );

    let catalog = StaticCatalog::new(vec![CuratedEntry {
        id: "kec-fe-2025".into(),
        title: "Frontend Intern".into(),
        company: "KEC Placement Cell".into(),
        kind: "internship".into(),
        tags: vec!["frontend".into(), "react".into()],
        source_url: Some("#".into()),
        added_at: None,
    }]);

    let profile = Profile {
        email: "demo@kec.edu".into(),
        role: "student".into(),
        department: "CSE".into(),
        skills: vec!["go".into(), "backend".into()],
        interests: vec!["cloud".into()],
    };

    let session = engine.new_session(&profile.email);
    let d = engine
        .discover(&session, &profile, &catalog, Trigger::Manual)
        .await?;

    for o in &d.opportunities {
        println!(
            "{:>5.1}  {:<10}  {:<28} {:<20} [{}]",
            o.match_score,
            o.match_method.as_str(),
            o.title,
            o.company,
            o.tags.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    println!(
        "status={:?} sources={}/{} ai_boosted={}",
        d.meta.status, d.meta.sources_succeeded, d.meta.sources_attempted, d.meta.ai_boosted
    );
    Ok(())
}
