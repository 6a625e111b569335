//! End-to-end coordination properties over the in-memory store.
//!
//! Exercises the session service the way the transports do: concurrent
//! joins and submissions, restart cycles, disconnects, and the shared
//! expiry clock.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use tablepick::domain::session_event::SessionEvent;
use tablepick::domain::{CandidateOption, OptionId, ParticipantId, RoomBus, SessionCode};
use tablepick::error::CoordinatorError;
use tablepick::service::{ExpiryCoordinator, SessionLocks, SessionService};
use tablepick::store::memory::MemoryStore;
use tablepick::store::{SessionStore, keys};

fn menu() -> Vec<CandidateOption> {
    ["pizza", "sushi", "thai", "ramen"]
        .iter()
        .map(|id| CandidateOption {
            id: OptionId::new(*id),
            name: format!("{id} place"),
            address: None,
            rating: None,
        })
        .collect()
}

fn picks(raw: &[&str]) -> Vec<OptionId> {
    raw.iter().map(|s| OptionId::new(*s)).collect()
}

struct Harness {
    store: Arc<MemoryStore>,
    service: SessionService,
    bus: Arc<RoomBus>,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let dyn_store: Arc<dyn SessionStore> = Arc::<MemoryStore>::clone(&store);
    let bus = Arc::new(RoomBus::new(256));
    let locks = Arc::new(SessionLocks::new());
    let expiry = Arc::new(ExpiryCoordinator::new(
        Arc::clone(&dyn_store),
        Arc::clone(&bus),
        Arc::clone(&locks),
        Duration::from_secs(1800),
    ));
    let service = SessionService::new(
        dyn_store,
        Arc::clone(&bus),
        locks,
        expiry,
        Duration::from_secs(3600),
    );
    Harness {
        store,
        service,
        bus,
    }
}

async fn new_session(h: &Harness) -> SessionCode {
    let Ok((code, _)) = h.service.create_session("maya", None, &menu()).await else {
        panic!("create failed");
    };
    code
}

async fn join(h: &Harness, code: &SessionCode, name: &str) -> ParticipantId {
    let pid = ParticipantId::new();
    let Ok(_) = h.service.join_session(code.as_str(), pid, name).await else {
        panic!("join failed for {name}");
    };
    pid
}

async fn assert_member_count(h: &Harness, code: &SessionCode, expected: u64) {
    let Ok(snapshot) = h.service.get_session(code.as_str()).await else {
        panic!("get failed");
    };
    assert_eq!(u64::from(snapshot.participant_count), expected);
    assert_eq!(snapshot.participants.len() as u64, expected);
}

#[tokio::test]
async fn participant_count_tracks_membership_through_joins_and_leaves() {
    let h = harness();
    let code = new_session(&h).await;

    let a = join(&h, &code, "ana").await;
    let b = join(&h, &code, "ben").await;
    let _c = join(&h, &code, "cai").await;

    assert_member_count(&h, &code, 3).await;

    h.service.leave_session(code.as_str(), a).await.ok();
    assert_member_count(&h, &code, 2).await;

    h.service.leave_session(code.as_str(), b).await.ok();
    assert_member_count(&h, &code, 1).await;
}

#[tokio::test]
async fn concurrent_first_joins_produce_exactly_one_host() {
    for _ in 0..10 {
        let h = harness();
        let code = new_session(&h).await;

        let mut joins = Vec::new();
        for name in ["ana", "ben", "cai", "dee"] {
            let service = h.service.clone();
            let code = code.clone();
            joins.push(tokio::spawn(async move {
                service
                    .join_session(code.as_str(), ParticipantId::new(), name)
                    .await
            }));
        }
        let mut host_count = 0;
        for handle in joins {
            let Ok(Ok(outcome)) = handle.await else {
                panic!("concurrent join failed");
            };
            if outcome.is_host {
                host_count += 1;
            }
        }
        assert_eq!(host_count, 1, "exactly one host per session");

        let Ok(snapshot) = h.service.get_session(code.as_str()).await else {
            panic!("get failed");
        };
        assert_eq!(
            snapshot.participants.iter().filter(|p| p.is_host).count(),
            1
        );
    }
}

#[tokio::test]
async fn fifth_concurrent_join_always_fails_full() {
    for _ in 0..10 {
        let h = harness();
        let code = new_session(&h).await;

        let mut joins = Vec::new();
        for i in 0..5 {
            let service = h.service.clone();
            let code = code.clone();
            joins.push(tokio::spawn(async move {
                service
                    .join_session(code.as_str(), ParticipantId::new(), &format!("p{i}"))
                    .await
            }));
        }
        let mut ok = 0;
        let mut full = 0;
        for handle in joins {
            match handle.await {
                Ok(Ok(_)) => ok += 1,
                Ok(Err(CoordinatorError::SessionFull(_))) => full += 1,
                other => panic!("unexpected join outcome: {other:?}"),
            }
        }
        assert_eq!(ok, 4);
        assert_eq!(full, 1);
    }
}

#[tokio::test]
async fn second_submit_conflicts_even_with_different_payload() {
    let h = harness();
    let code = new_session(&h).await;
    let a = join(&h, &code, "ana").await;
    let _b = join(&h, &code, "ben").await;

    let Ok(_) = h
        .service
        .submit_selections(code.as_str(), a, &picks(&["pizza"]))
        .await
    else {
        panic!("first submit failed");
    };
    let again = h
        .service
        .submit_selections(code.as_str(), a, &picks(&["thai"]))
        .await;
    assert!(matches!(again, Err(CoordinatorError::AlreadySubmitted)));
}

#[tokio::test]
async fn results_broadcast_fires_exactly_once_under_concurrent_final_submissions() {
    for _ in 0..10 {
        let h = harness();
        let code = new_session(&h).await;

        let members: Vec<ParticipantId> = [
            join(&h, &code, "ana").await,
            join(&h, &code, "ben").await,
            join(&h, &code, "cai").await,
            join(&h, &code, "dee").await,
        ]
        .into();

        let mut room = h.bus.subscribe(&code).await;

        let mut submits = Vec::new();
        for pid in members {
            let service = h.service.clone();
            let code = code.clone();
            submits.push(tokio::spawn(async move {
                service
                    .submit_selections(code.as_str(), pid, &picks(&["sushi"]))
                    .await
            }));
        }
        let mut completions = 0;
        for handle in submits {
            let Ok(Ok(outcome)) = handle.await else {
                panic!("concurrent submit failed");
            };
            if outcome.completed_round {
                completions += 1;
            }
        }
        assert_eq!(completions, 1, "exactly one submission completes the round");

        let mut results_events = 0;
        while let Ok(envelope) = room.try_recv() {
            if matches!(envelope.event, SessionEvent::SessionResults { .. }) {
                results_events += 1;
            }
        }
        assert_eq!(results_events, 1, "results broadcast is emitted once");
    }
}

#[tokio::test]
async fn full_cycle_restart_then_second_round_overlap() {
    let h = harness();
    let code = new_session(&h).await;
    let a = join(&h, &code, "ana").await;
    let b = join(&h, &code, "ben").await;

    // Round one: {pizza, sushi} ∩ {sushi, thai} = {sushi}.
    h.service
        .submit_selections(code.as_str(), a, &picks(&["pizza", "sushi"]))
        .await
        .ok();
    let mut room = h.bus.subscribe(&code).await;
    h.service
        .submit_selections(code.as_str(), b, &picks(&["sushi", "thai"]))
        .await
        .ok();

    let mut first_round_overlap = None;
    while let Ok(envelope) = room.try_recv() {
        if let SessionEvent::SessionResults {
            overlapping,
            has_overlap,
            ..
        } = envelope.event
        {
            assert!(has_overlap);
            first_round_overlap = Some(overlapping);
        }
    }
    let Some(overlap) = first_round_overlap else {
        panic!("no results event in round one");
    };
    assert_eq!(overlap.len(), 1);
    assert_eq!(overlap.first().map(|o| o.id.as_str()), Some("sushi"));

    // Restart preserves membership and host, clears round state.
    let Ok(snapshot) = h.service.restart_session(code.as_str(), a).await else {
        panic!("restart failed");
    };
    assert_eq!(snapshot.participant_count, 2);
    assert_eq!(snapshot.submitted_count, 0);
    assert_eq!(snapshot.participants.iter().filter(|p| p.is_host).count(), 1);

    // Round two: disjoint picks -> no overlap.
    h.service
        .submit_selections(code.as_str(), a, &picks(&["pizza"]))
        .await
        .ok();
    let mut room = h.bus.subscribe(&code).await;
    h.service
        .submit_selections(code.as_str(), b, &picks(&["thai"]))
        .await
        .ok();

    let mut saw_empty_results = false;
    while let Ok(envelope) = room.try_recv() {
        if let SessionEvent::SessionResults {
            overlapping,
            has_overlap,
            ..
        } = envelope.event
        {
            assert!(!has_overlap);
            assert!(overlapping.is_empty());
            saw_empty_results = true;
        }
    }
    assert!(saw_empty_results, "round two must produce empty results");
}

#[tokio::test]
async fn refresh_keeps_every_owned_key_on_one_clock() {
    let h = harness();
    let code = new_session(&h).await;
    let a = join(&h, &code, "ana").await;
    let b = join(&h, &code, "ben").await;
    h.service
        .submit_selections(code.as_str(), a, &picks(&["pizza"]))
        .await
        .ok();

    // The last activity (the submit) refreshed everything; read back the
    // absolute deadline of each live session key.
    let mut deadlines = Vec::new();
    for key in [
        keys::session(&code),
        keys::members(&code),
        keys::submitted(&code),
        keys::candidates(&code),
        keys::presence(&code),
        keys::host(&code),
        keys::member(&code, a),
        keys::member(&code, b),
        keys::picks(&code, a),
    ] {
        let at = h
            .store
            .expires_at(&key)
            .await
            .unwrap_or_else(|_| panic!("expires_at failed for {key}"));
        let Some(at) = at else {
            panic!("key {key} has no expiry");
        };
        deadlines.push(at);
    }
    deadlines.dedup();
    assert_eq!(deadlines.len(), 1, "all owned keys share one deadline");
}

#[tokio::test]
async fn disconnect_preserves_count_and_submissions() {
    let h = harness();
    let code = new_session(&h).await;
    let a = join(&h, &code, "ana").await;
    let _b = join(&h, &code, "ben").await;

    h.service
        .submit_selections(code.as_str(), a, &picks(&["pizza"]))
        .await
        .ok();

    h.service.handle_disconnect(&code, a).await;

    let Ok(snapshot) = h.service.get_session(code.as_str()).await else {
        panic!("get failed");
    };
    assert_eq!(snapshot.participant_count, 2);
    assert_eq!(snapshot.submitted_count, 1);
    let Some(ana) = snapshot
        .participants
        .iter()
        .find(|p| p.display_name == "ana")
    else {
        panic!("ana vanished on disconnect");
    };
    assert!(ana.has_submitted);
    assert!(ana.is_host);
    assert!(!ana.online);
}

#[tokio::test]
async fn expired_session_raises_room_event_and_vanishes() {
    let h = harness();
    let code = new_session(&h).await;
    let _a = join(&h, &code, "ana").await;

    h.service.expiry().initialize().await;
    let mut room = h.bus.subscribe(&code).await;

    // Force the whole session onto an imminent deadline, as if the TTL
    // window had elapsed.
    let soon = chrono::Utc::now().timestamp_millis() + 30;
    let member_ids = vec![_a];
    h.store
        .expire_all_at(&keys::owned_by_session(&code, &member_ids), soon)
        .await
        .ok();

    let envelope = tokio::time::timeout(Duration::from_secs(2), room.recv()).await;
    let Ok(Ok(envelope)) = envelope else {
        panic!("expected session:expired event");
    };
    let SessionEvent::SessionExpired { reason, .. } = &envelope.event else {
        panic!("wrong event: {}", envelope.event.event_type_str());
    };
    assert_eq!(reason, "inactivity");

    assert!(matches!(
        h.service.get_session(code.as_str()).await,
        Err(CoordinatorError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn stranger_actions_are_unauthorized() {
    let h = harness();
    let code = new_session(&h).await;
    let _member = join(&h, &code, "ana").await;
    let stranger = ParticipantId::new();

    assert!(matches!(
        h.service
            .submit_selections(code.as_str(), stranger, &picks(&["pizza"]))
            .await,
        Err(CoordinatorError::NotInSession(_))
    ));
    assert!(matches!(
        h.service.restart_session(code.as_str(), stranger).await,
        Err(CoordinatorError::NotInSession(_))
    ));
    assert!(matches!(
        h.service.leave_session(code.as_str(), stranger).await,
        Err(CoordinatorError::NotInSession(_))
    ));
}
