//! Unit tests for the per-turn session transition.

use super::*;
use crate::graph::KnowledgeGraph;
use crate::matcher::{ScoredMatch, ScoredTicketMatch};
use pretty_assertions::assert_eq;

fn graph() -> KnowledgeGraph {
    KnowledgeGraph::builder()
        .phenomenon("P1", "wait_io high", "iostat -x 1")
        .phenomenon("P2", "dirty pages accumulating", "SHOW ENGINE INNODB STATUS")
        .phenomenon("P3", "fsync latency spikes", "perf trace")
        .phenomenon("P4", "buffer pool hit ratio low", "SHOW GLOBAL STATUS")
        .root_cause("RC1", "disk saturation", "move data files to faster storage")
        .root_cause("RC2", "undersized buffer pool", "raise innodb_buffer_pool_size")
        .ticket("T1", "RC1", ["P1", "P2"])
        .ticket("T2", "RC1", ["P1", "P2", "P3"])
        .ticket("T3", "RC2", ["P1", "P4"])
        .build()
}

fn config() -> DiagnosisConfig {
    DiagnosisConfig::default()
}

#[test]
fn test_confirming_two_phenomena_reaches_diagnosis() {
    let graph = graph();
    let session = Session::new("database is slow");

    let (session, first) = session.advance(&TurnInput::new().confirm("P1"), &graph, &config());
    assert_eq!(first.round, 1);
    assert_eq!(first.status, DiagnosisStatus::Narrowing);
    assert_eq!(first.hypotheses[0].root_cause_id, "RC1");
    assert!((first.hypotheses[0].confidence - 0.5).abs() < 1e-9);
    match &first.next {
        NextStep::Recommend { recommendations } => {
            assert_eq!(recommendations[0].phenomenon_id, "P2");
            assert!(recommendations.iter().all(|r| r.phenomenon_id != "P1"));
        }
        other => panic!("expected recommendations, got {:?}", other),
    }

    let (session, second) = session.advance(&TurnInput::new().confirm("P2"), &graph, &config());
    assert_eq!(second.round, 2);
    assert_eq!(second.status, DiagnosisStatus::Confirming);
    assert!((second.hypotheses[0].confidence - 1.0).abs() < 1e-9);
    // RC2 is penalized once RC1 pulls clearly ahead.
    assert!((second.hypotheses[1].confidence - 0.35).abs() < 1e-9);

    let NextStep::Diagnose { diagnosis } = &second.next else {
        panic!("expected a diagnosis, got {:?}", second.next);
    };
    assert_eq!(diagnosis.root_cause_id, "RC1");
    assert_eq!(diagnosis.reference_tickets[0].ticket_id, "T1");
    assert_eq!(session.status, DiagnosisStatus::Diagnosed);
    assert_eq!(session.diagnosis.as_ref(), Some(diagnosis));
    assert!(session.recommendations.is_empty());
}

#[test]
fn test_denial_blocks_every_linked_root_cause() {
    let graph = graph();
    let session = Session::new("database is slow");

    let (session, outcome) = session.advance(&TurnInput::new().deny("P1"), &graph, &config());
    assert!(outcome.hypotheses.is_empty());
    assert!(session.symptom.is_root_cause_blocked("RC1"));
    assert!(session.symptom.is_root_cause_blocked("RC2"));

    let (_, outcome) = session.advance(&TurnInput::new().confirm("P3"), &graph, &config());
    assert!(outcome.hypotheses.is_empty());
    assert_eq!(outcome.status, DiagnosisStatus::Exploring);
    assert_eq!(outcome.next, NextStep::InsufficientInformation);
}

#[test]
fn test_invalid_items_are_reported_not_fatal() {
    let graph = graph();
    let session = Session::new("database is slow");
    let input = TurnInput::new()
        .confirm("P404")
        .confirm_with_score("P2", 1.5)
        .confirm_with_score("P3", f64::NAN)
        .confirm("P4")
        .deny("P4")
        .deny("P999")
        .with_root_cause_match("RC404", 0.8)
        .with_ticket_match("T404", "RC404", 0.5)
        .confirm("P1");

    let (session, outcome) = session.advance(&input, &graph, &config());

    let fields: Vec<(&str, &str)> = outcome
        .ignored
        .iter()
        .map(|i| (i.field.as_str(), i.value.as_str()))
        .collect();
    assert_eq!(
        fields,
        vec![
            ("denied", "P999"),
            ("confirmed", "P404"),
            ("confirmed", "P2"),
            ("confirmed", "P3"),
            ("confirmed", "P4"),
            ("root_cause_matches", "RC404"),
            ("ticket_matches", "T404"),
        ]
    );
    assert_eq!(session.symptom.confirmed_phenomenon_ids().len(), 1);
    assert!(session.symptom.is_phenomenon_blocked("P4"));
    assert_eq!(outcome.round, 1);
}

#[test]
fn test_round_increments_once_per_turn() {
    let graph = graph();
    let mut session = Session::new("database is slow");

    for expected in 1..=4 {
        let (next, outcome) = session.advance(&TurnInput::new(), &graph, &config());
        assert_eq!(outcome.round, expected);
        assert_eq!(next.round_count, expected);
        session = next;
    }
}

#[test]
fn test_advance_leaves_original_untouched() {
    let graph = graph();
    let session = Session::new("database is slow");

    let (next, _) = session.advance(&TurnInput::new().confirm("P1"), &graph, &config());

    assert_eq!(session.round_count, 0);
    assert!(session.symptom.is_empty());
    assert_eq!(next.symptom.confirmed_count(), 1);
}

#[test]
fn test_stuck_hint_after_empty_rounds() {
    let graph = graph();
    let mut session = Session::new("database is slow");

    let mut stuck = Vec::new();
    for _ in 0..3 {
        let (next, outcome) = session.advance(&TurnInput::new(), &graph, &config());
        stuck.push(outcome.stuck);
        session = next;
    }
    assert_eq!(stuck, vec![false, false, true]);
    assert!(session.stuck);

    // Recoverable: strong evidence clears the hint.
    let input = TurnInput::new().confirm("P1").confirm("P2");
    let (session, outcome) = session.advance(&input, &graph, &config());
    assert!(!outcome.stuck);
    assert!(!session.stuck);
}

#[test]
fn test_diagnosed_session_does_not_plan_again() {
    let graph = graph();
    let session = Session::new("database is slow");
    let input = TurnInput::new().confirm("P1").confirm("P2");
    let (session, _) = session.advance(&input, &graph, &config());
    assert_eq!(session.status, DiagnosisStatus::Diagnosed);

    let (session, outcome) = session.advance(&TurnInput::new().confirm("P4"), &graph, &config());

    assert_eq!(outcome.status, DiagnosisStatus::Diagnosed);
    assert_eq!(outcome.round, 2);
    assert!(matches!(outcome.next, NextStep::Diagnose { .. }));
    assert!(session.recommendations.is_empty());
    assert_eq!(session.symptom.confirmed_count(), 3);
}

#[test]
fn test_root_cause_match_contributes_for_one_turn() {
    let graph = graph();
    let session = Session::new("database is slow");

    let input = TurnInput::new().with_root_cause_match("RC2", 1.0);
    let (session, outcome) = session.advance(&input, &graph, &config());
    assert_eq!(outcome.hypotheses.len(), 1);
    assert_eq!(outcome.hypotheses[0].root_cause_id, "RC2");
    assert!((outcome.hypotheses[0].confidence - 0.3).abs() < 1e-9);

    let (_, outcome) = session.advance(&TurnInput::new(), &graph, &config());
    assert!(outcome.hypotheses.is_empty());
}

#[test]
fn test_unmatched_text_is_recorded() {
    let graph = graph();
    let session = Session::new("database is slow");

    let input = TurnInput::new().with_unmatched_text("disk looks busy");
    let (session, outcome) = session.advance(&input, &graph, &config());

    assert_eq!(session.symptom.observations().len(), 1);
    assert_eq!(session.symptom.confirmed_count(), 0);
    assert!(outcome.hypotheses.is_empty());
}

#[test]
fn test_from_match_result() {
    let result = MatchResult {
        phenomena: vec![ScoredMatch {
            id: "P1".to_string(),
            score: 0.8,
        }],
        tickets: vec![ScoredTicketMatch {
            id: "T3".to_string(),
            root_cause_id: "RC2".to_string(),
            score: 0.6,
        }],
        ..Default::default()
    };

    let input = TurnInput::from_match_result(&result, "iowait is pegged");
    assert_eq!(input.confirmed.len(), 1);
    assert!((input.confirmed[0].score - 0.8).abs() < f64::EPSILON);
    assert_eq!(input.ticket_matches[0].ticket_id, "T3");
    assert!(input.unmatched_text.is_none());

    let input = TurnInput::from_match_result(&MatchResult::default(), "something odd");
    assert_eq!(input.unmatched_text.as_deref(), Some("something odd"));
}

#[test]
fn test_turn_input_deserializes_with_defaults() {
    let input: TurnInput = serde_json::from_value(serde_json::json!({
        "confirmed": [{"phenomenon_id": "P1"}],
        "denied": ["P4"]
    }))
    .unwrap();

    assert!((input.confirmed[0].score - 1.0).abs() < f64::EPSILON);
    assert_eq!(input.denied, vec!["P4"]);
    assert!(input.root_cause_matches.is_empty());
}

#[test]
fn test_next_step_is_tagged() {
    let value = serde_json::to_value(NextStep::InsufficientInformation).unwrap();
    assert_eq!(value, serde_json::json!({"kind": "insufficient_information"}));
}
