//! Battle integration tests: full debate and vote with scripted actors.
//!
//! Covers: round-robin order ↔ cumulative context ↔ termination ↔ voting
//! ↔ tie-break running together through `BattleController`.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::{actor, no_tools, ScriptedBackend};
use coordination::battle::{EventKind, EXECUTION_FAILURE, MODERATOR};
use coordination::{
    ActorExecutor, ActorId, AnalysisOutcome, AnalysisResultMap, BattleConfig, BattleController,
    BattleState, Completion, RetryPolicy, StateViolation,
};

fn research() -> AnalysisResultMap {
    let mut map = AnalysisResultMap::new();
    map.insert(
        ActorId::new("a"),
        AnalysisOutcome::Completed {
            statement: "Momentum is building above the 20-day average.".into(),
        },
    );
    map.insert(
        ActorId::new("b"),
        AnalysisOutcome::Failed {
            reason: "backend failed".into(),
        },
    );
    map
}

fn labels(ls: &[&str]) -> Vec<String> {
    ls.iter().map(|s| s.to_string()).collect()
}

fn controller(backend: Arc<ScriptedBackend>, rounds: u32, vote_labels: &[&str]) -> BattleController {
    let executor = ActorExecutor::new(backend, no_tools()).with_retry(RetryPolicy::none());
    BattleController::new(
        executor,
        BattleConfig {
            debate_rounds: rounds,
            turn_max_steps: 2,
            vote_labels: labels(vote_labels),
        },
    )
}

fn register_all(c: &mut BattleController, ids: &[&str]) {
    for id in ids {
        c.register(actor(id)).unwrap();
    }
}

// ── Round-robin strictness ─────────────────────────────────────────

#[tokio::test]
async fn test_three_actors_two_rounds_speak_in_roster_order() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .debater("a", "bullish")
            .debater("b", "bullish")
            .debater("c", "bearish"),
    );
    let mut c = controller(backend.clone(), 2, &["bullish", "bearish"]);
    register_all(&mut c, &["a", "b", "c"]);

    let outcome = c.run(&research()).await.unwrap();

    let speakers: Vec<&str> = outcome.statements().map(|(id, _)| id.as_str()).collect();
    assert_eq!(speakers, vec!["a", "b", "c", "a", "b", "c"]);
    assert_eq!(outcome.rounds_completed, 2);
    assert_eq!(outcome.decision.as_deref(), Some("bullish"));
    assert_eq!(outcome.tally["bullish"], 2);
    assert_eq!(outcome.tally["bearish"], 1);
    assert!(!outcome.tie_broken);
    assert_eq!(outcome.summary.voted, 3);
    assert_eq!(outcome.summary.terminated, 0);
    // 6 debate turns + 3 votes, one backend call each.
    assert_eq!(outcome.total_backend_calls, 9);
    assert_eq!(backend.calls().len(), 9);
}

#[tokio::test]
async fn test_round_boundaries_are_moderator_events() {
    let backend = Arc::new(ScriptedBackend::new().debater("a", "bullish"));
    let mut c = controller(backend, 3, &["bullish", "bearish"]);
    register_all(&mut c, &["a"]);

    let outcome = c.run(&research()).await.unwrap();

    let boundaries: Vec<u32> = outcome
        .transcript
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::RoundBoundary { round } => {
                assert_eq!(e.actor.as_str(), MODERATOR);
                Some(round)
            }
            _ => None,
        })
        .collect();
    assert_eq!(boundaries, vec![1, 2, 3]);
    let seqs: Vec<usize> = outcome.transcript.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..outcome.transcript.len()).collect::<Vec<_>>());
}

// ── Cumulative context ─────────────────────────────────────────────

#[tokio::test]
async fn test_each_speaker_context_extends_the_previous_one() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .debater("a", "bullish")
            .debater("b", "bearish")
            .debater("c", "bearish"),
    );
    let mut c = controller(backend.clone(), 2, &["bullish", "bearish"]);
    register_all(&mut c, &["a", "b", "c"]);

    c.run(&research()).await.unwrap();

    let contexts: Vec<String> = backend
        .calls()
        .iter()
        .map(|call| call.context().to_string())
        .collect();
    assert_eq!(contexts.len(), 9);
    assert!(contexts[0].contains("Momentum is building"));
    assert!(contexts[0].contains("(analysis unavailable: backend failed)"));
    for pair in contexts.windows(2) {
        assert!(
            pair[1].starts_with(&pair[0]),
            "later context must extend the earlier one"
        );
        assert!(pair[1].len() > pair[0].len());
    }
    // Round 2 speaker a sees everything round 1 said.
    let a_round2 = &contexts[3];
    for speaker in ["a", "b", "c"] {
        assert!(a_round2.contains(&format!("{speaker} argues its case")));
    }
}

// ── Termination ────────────────────────────────────────────────────

#[tokio::test]
async fn test_errored_actor_never_speaks_again() {
    common::init_test_subscriber();
    let backend = Arc::new(
        ScriptedBackend::new()
            .debater("a", "bullish")
            .broken("b")
            .debater("c", "bearish"),
    );
    let mut c = controller(backend.clone(), 3, &["bullish", "bearish"]);
    register_all(&mut c, &["a", "b", "c"]);

    let outcome = c.run(&research()).await.unwrap();

    let b = ActorId::new("b");
    assert_eq!(outcome.terminated[&b], EXECUTION_FAILURE);
    assert_eq!(backend.calls_for("b").len(), 1);
    assert!(outcome.statements().all(|(id, _)| id != &b));
    let speakers: Vec<&str> = outcome.statements().map(|(id, _)| id.as_str()).collect();
    assert_eq!(speakers, vec!["a", "c", "a", "c", "a", "c"]);
    let termination = outcome
        .transcript
        .iter()
        .find(|e| matches!(e.kind, EventKind::Termination { .. }))
        .unwrap();
    assert_eq!(termination.actor, b);
    assert_eq!(termination.round, 1);
    // Terminated actors do not vote.
    assert!(outcome.ballots.iter().all(|(id, _)| id != &b));
    assert_eq!(outcome.summary.roster_size, 3);
    assert_eq!(outcome.summary.voted, 2);
}

#[tokio::test]
async fn test_everyone_failing_resolves_early_without_vote() {
    common::init_test_subscriber();
    let backend = Arc::new(ScriptedBackend::new().broken("a").broken("b"));
    let mut c = controller(backend.clone(), 2, &["bullish", "bearish"]);
    register_all(&mut c, &["a", "b"]);

    let outcome = c.run(&research()).await.unwrap();

    assert_eq!(outcome.decision, None);
    assert!(outcome.tally.is_empty());
    assert_eq!(outcome.rounds_completed, 0);
    assert_eq!(outcome.summary.terminated, 2);
    assert_eq!(backend.calls().len(), 2);
    assert!(!outcome
        .transcript
        .iter()
        .any(|e| matches!(e.kind, EventKind::Vote { .. } | EventKind::Abstained { .. })));
}

// ── Voting ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tie_goes_to_earliest_roster_position() {
    // x:A y:B z:terminated w:B v:A → {A:2, B:2}, x is earliest.
    for _ in 0..3 {
        let backend = Arc::new(
            ScriptedBackend::new()
                .debater("x", "A")
                .debater("y", "B")
                .broken("z")
                .debater("w", "B")
                .debater("v", "A"),
        );
        let mut c = controller(backend, 1, &["A", "B"]);
        register_all(&mut c, &["x", "y", "z", "w", "v"]);

        let outcome = c.run(&research()).await.unwrap();

        assert_eq!(outcome.tally["A"], 2);
        assert_eq!(outcome.tally["B"], 2);
        assert!(outcome.tie_broken);
        assert_eq!(outcome.decision.as_deref(), Some("A"));
    }
}

#[tokio::test]
async fn test_vote_failure_is_abstention_not_tally() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .debater("a", "bullish")
            .script("b", |transcript| {
                if common::last_user(transcript).contains("final vote") {
                    Err(coordination::BackendError::Rejected("quota".into()))
                } else {
                    Ok(Completion::final_answer("b keeps an open mind for now"))
                }
            })
            .debater("c", "I really cannot decide"),
    );
    let mut c = controller(backend, 1, &["bullish", "bearish"]);
    register_all(&mut c, &["a", "b", "c"]);

    let outcome = c.run(&research()).await.unwrap();

    let abstained: Vec<&str> = outcome
        .transcript
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Abstained { .. }))
        .map(|e| e.actor.as_str())
        .collect();
    assert_eq!(abstained, vec!["b", "c"]);
    assert_eq!(outcome.tally.values().sum::<u32>(), 1);
    assert_eq!(outcome.decision.as_deref(), Some("bullish"));
    assert_eq!(outcome.summary.abstained, 2);
    // Abstaining is not termination.
    assert!(outcome.terminated.is_empty());
}

// ── Roster ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_roster_is_sealed_once_running() {
    let backend = Arc::new(ScriptedBackend::new().debater("a", "bullish"));
    let mut c = controller(backend, 1, &["bullish", "bearish"]);
    register_all(&mut c, &["a"]);
    assert!(matches!(
        c.register(actor("a")),
        Err(StateViolation::DuplicateActor { .. })
    ));

    c.run(&research()).await.unwrap();

    assert!(matches!(
        c.register(actor("late")),
        Err(StateViolation::RosterSealed { .. })
    ));
}

#[tokio::test]
async fn test_moderator_id_is_reserved() {
    let backend = Arc::new(ScriptedBackend::new().debater("a", "bullish"));
    let mut c = controller(backend, 1, &["bullish", "bearish"]);

    let err = c.register(actor(MODERATOR)).unwrap_err();

    assert!(matches!(err, StateViolation::ReservedActor { ref actor } if actor.as_str() == MODERATOR));
    assert!(c.roster().is_empty());
}

// ── Fatal bookkeeping violations ───────────────────────────────────

#[tokio::test]
async fn test_ambiguous_ballot_aborts_with_debate_transcript() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .debater("a", "bullish")
            .debater("b", "bearish"),
    );
    // Same option twice under different case: the vote cannot be tallied.
    let mut c = controller(backend.clone(), 2, &["bullish", "Bullish"]);
    register_all(&mut c, &["a", "b"]);

    let err = c.run(&research()).await.unwrap_err();

    assert!(matches!(
        err.violation(),
        StateViolation::AmbiguousBallot { labels } if labels.len() == 2
    ));
    // The whole debate happened and is handed back for diagnosis.
    let transcript = err.transcript();
    let speakers: Vec<&str> = transcript
        .iter()
        .filter(|e| e.is_statement())
        .map(|e| e.actor.as_str())
        .collect();
    assert_eq!(speakers, vec!["a", "b", "a", "b"]);
    let boundaries = transcript
        .iter()
        .filter(|e| matches!(e.kind, EventKind::RoundBoundary { .. }))
        .count();
    assert_eq!(boundaries, 2);
    assert!(!transcript
        .iter()
        .any(|e| matches!(e.kind, EventKind::Vote { .. } | EventKind::Abstained { .. })));
    // Nobody was asked to vote.
    assert!(backend.calls().iter().all(|call| !call.is_vote()));
}

#[tokio::test]
async fn test_highlights_recorded_from_statements() {
    let backend = Arc::new(ScriptedBackend::new().debater("a", "bullish"));
    let mut c = controller(backend, 4, &["bullish", "bearish"]);
    register_all(&mut c, &["a"]);

    let outcome = c.run(&research()).await.unwrap();

    // Same line every round: recorded once.
    assert_eq!(outcome.highlights.len(), 1);
    assert_eq!(outcome.highlights[0].actor.as_str(), "a");
}

// ── Partition invariant under direct state mutation ───────────────

#[test]
fn test_partition_holds_after_every_transition() {
    let roster: Vec<ActorId> = ["a", "b", "c", "d"].iter().map(|s| ActorId::new(*s)).collect();
    let all: BTreeSet<ActorId> = roster.iter().cloned().collect();
    let labels = labels(&["bullish", "bearish"]);
    let mut s = BattleState::new(roster.clone()).unwrap();

    let check = |s: &BattleState| {
        s.check_invariants().unwrap();
        let active: BTreeSet<ActorId> = s.active_in_order().into_iter().collect();
        let terminated: BTreeSet<ActorId> = s.terminated().keys().cloned().collect();
        assert!(active.is_disjoint(&terminated));
        assert_eq!(&active | &terminated, all);
    };

    check(&s);
    s.begin_debate().unwrap();
    check(&s);
    s.record_statement(&roster[0], "opening").unwrap();
    check(&s);
    s.terminate(&roster[1], EXECUTION_FAILURE).unwrap();
    check(&s);
    s.record_statement(&roster[2], "reply").unwrap();
    check(&s);
    s.terminate(&roster[3], EXECUTION_FAILURE).unwrap();
    check(&s);
    s.close_round().unwrap();
    check(&s);
    s.begin_voting().unwrap();
    s.record_vote(&roster[0], "bullish", &labels).unwrap();
    check(&s);
    s.record_abstention(&roster[2], "no decision label").unwrap();
    check(&s);
    assert!(matches!(
        s.record_vote(&roster[1], "bearish", &labels),
        Err(StateViolation::ActorTerminated { .. })
    ));
    s.finish().unwrap();
    check(&s);
}
