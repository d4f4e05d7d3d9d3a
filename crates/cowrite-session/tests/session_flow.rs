use cowrite_core::{Dimension, DimensionScores, Edge, RoundAnalysis, RoundType, TextState};
use cowrite_diff::{DiffResolution, TextRange};
use cowrite_session::generation::run_generation;
use cowrite_session::{
    GenerateResponse, GenerationError, GenerationOutcome, MockAnalyzer, MockGenerator, Session,
    SessionConfig, SessionError,
};
use std::time::{Duration, Instant};

fn analysis(round_id: &str, scores: DimensionScores, edges: Vec<Edge>) -> RoundAnalysis {
    RoundAnalysis {
        round_id: round_id.to_string(),
        scores,
        edges,
        concepts_preserved: vec!["gratitude".into()],
        concepts_added: Vec::new(),
        concepts_lost: Vec::new(),
        narrative_summary: format!("{round_id} kept the thanks"),
    }
}

#[tokio::test]
async fn write_edit_regenerate_analyze_and_reload() {
    let mut session = Session::with_text("A toast for Sam", "Friends, ", SessionConfig::default());
    let generator = MockGenerator::new();

    // Continue from the caret.
    let prepared = session
        .prepare_prompt_request("say something warm", TextRange::new(9, 9))
        .unwrap();
    generator.push_gaps(&[(prepared.request.gaps[0].id.as_str(), "thank you all for coming.")]);
    let result = run_generation(
        &generator,
        &prepared.request,
        prepared.timeout,
        prepared.cancel.clone(),
    )
    .await;
    let outcome = session.finish_generation(prepared.id, result).unwrap();
    assert!(matches!(outcome, GenerationOutcome::Inserted { ref round_id, .. } if round_id == "r-1"));
    assert_eq!(session.text(), "Friends, thank you all for coming.");

    // Edit the AI text in place, then let the debounce window lapse.
    let t0 = Instant::now();
    let edit = session
        .replace_text(TextRange::new(19, 22), "everyone", t0)
        .unwrap();
    assert_eq!(edit.round_id.as_deref(), Some("r-2"));
    assert_eq!(
        session.tick(t0 + Duration::from_secs(3)).unwrap().as_deref(),
        Some("r-2")
    );
    let inline = session.ledger().get_round("r-2").unwrap();
    assert!(inline.sealed);
    assert_eq!(inline.parent_rounds, vec!["r-1"]);

    // Strike the last word and regenerate it.
    let click = session.click(33).unwrap().unwrap();
    assert_eq!(session.document().slice(click.range), "coming.");
    assert_eq!(session.document().state_at(33), Some(TextState::MarkedDelete));

    let prepared = session.prepare_regenerate().unwrap().unwrap();
    assert_eq!(prepared.request.gaps.len(), 1);
    assert_eq!(prepared.request.gaps[0].original_text, "coming.");
    generator.push_gaps(&[(prepared.request.gaps[0].id.as_str(), "being here.")]);
    let result = run_generation(
        &generator,
        &prepared.request,
        prepared.timeout,
        prepared.cancel.clone(),
    )
    .await;
    let GenerationOutcome::Proposed { round_id, diff_ids } =
        session.finish_generation(prepared.id, result).unwrap()
    else {
        panic!("expected a proposal");
    };
    assert_eq!(round_id, "r-3");
    session
        .resolve_diff(&diff_ids[0], DiffResolution::Accept)
        .unwrap();
    assert_eq!(session.text(), "Friends, thank you everyone for being here.");

    // Analysis: r-1 has nothing configured and fails, the rest apply.
    let analyzer = MockAnalyzer::new();
    analyzer.set_result(analysis("r-2", DimensionScores::new(0.6, 0.2, 0.7), Vec::new()));
    analyzer.set_result(analysis(
        "r-3",
        DimensionScores::new(0.0, 0.1, 0.2),
        vec![Edge {
            to: "r-2".into(),
            dimension: Dimension::D1,
            strength: 0.5,
            reason: "kept the edited wording".into(),
        }],
    ));
    let report = session.analyze(&analyzer).await.unwrap();
    assert_eq!(report.applied, vec!["r-2", "r-3"]);
    assert_eq!(report.failed, vec!["r-1"]);
    assert!(session.graph().get_node("r-3").unwrap().narrative.is_some());

    let second = session.analyze(&analyzer).await.unwrap();
    assert!(second.applied.is_empty() && second.failed.is_empty());

    let contributions = session.contributions();
    assert_eq!(contributions.len(), 3);
    assert_eq!(contributions[1].round_type, RoundType::InlineEdit);
    assert!(contributions.iter().all(|c| (1..=5).contains(&c.level)));
    assert!(contributions[2].accumulated.d1 >= contributions[2].base.d1);

    // Save and reload.
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join(format!("{}.json", session.id()));
    session.save(&path).unwrap();
    let reloaded = Session::load(&path, SessionConfig::default()).unwrap();
    assert_eq!(reloaded.snapshot(), session.snapshot());
    assert_eq!(reloaded.contributions(), contributions);
}

#[tokio::test(start_paused = true)]
async fn timed_out_generation_leaves_document_writable() {
    let config = SessionConfig {
        generation_timeout_secs: 15,
        ..Default::default()
    };
    let mut session = Session::with_text("g", "Make this better.", config);
    session
        .mark(TextRange::new(5, 9), TextState::MarkedDelete)
        .unwrap();
    let generator = MockGenerator::new().with_delay(Duration::from_secs(60));
    generator.push_gaps(&[("unused", "late")]);

    let err = session.regenerate(&generator).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Generation(GenerationError::Timeout { secs: 15 })
    ));
    assert!(!session.is_read_only());
    assert!(session.ledger().is_empty());
    assert_eq!(session.text(), "Make this better.");
    session.type_text(0, "Please ", Instant::now()).unwrap();
}

#[tokio::test]
async fn mismatched_response_shape_is_a_service_error() {
    let mut session = Session::with_text("g", "One two.", SessionConfig::default());
    let generator = MockGenerator::new();
    generator.push(Ok(GenerateResponse::Gaps { gaps: Vec::new() }));
    let err = session.smart_edit(&generator, "shorter").await.unwrap_err();
    match err {
        SessionError::Generation(e) => assert!(!e.retryable()),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!session.is_read_only());
}
