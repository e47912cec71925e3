use std::time::Duration;

use seabattle::{
    Config, GameError, MatchId, MatchKind, Outcome, Participant, Phase, SessionRegistry,
};
use tokio::time::Instant;

fn registry(max: usize) -> std::sync::Arc<SessionRegistry> {
    let config = Config::default()
        .with_max_active_sessions(max)
        .with_eviction_delay(Duration::from_secs(60));
    SessionRegistry::with_seed(config, 99)
}

#[test]
fn test_create_binds_creator() {
    let reg = registry(4);
    let handle = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    assert!(reg.is_participant_active("alice"));
    assert_eq!(reg.match_of("alice"), Some(handle.id()));
    assert_eq!(reg.count_active(), 1);
    assert_eq!(handle.lock().phase(), &Phase::AwaitingOpponent);
}

#[test]
fn test_pvai_gets_numbered_ai_opponents() {
    let reg = registry(4);
    let first = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsAi).unwrap();
    let second = reg.create_match(Participant::human("bob"), MatchKind::PlayerVsAi).unwrap();
    assert_eq!(first.lock().second().unwrap().name(), "AI_Player_1");
    assert_eq!(second.lock().second().unwrap().name(), "AI_Player_2");
    assert_eq!(first.lock().phase(), &Phase::PlacingShips);
    assert!(!reg.is_participant_active("AI_Player_1"));
}

#[test]
fn test_capacity_limit() {
    let reg = registry(2);
    reg.create_match(Participant::human("a"), MatchKind::PlayerVsPlayer).unwrap();
    reg.create_match(Participant::human("b"), MatchKind::PlayerVsAi).unwrap();
    let err = reg
        .create_match(Participant::human("c"), MatchKind::PlayerVsPlayer)
        .unwrap_err();
    assert_eq!(err, GameError::CapacityExceeded { max: 2 });
    assert!(!reg.is_participant_active("c"));
    assert_eq!(reg.count_active(), 2);
}

#[test]
fn test_single_active_match_per_participant() {
    let reg = registry(4);
    let handle = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    assert_eq!(
        reg.create_match(Participant::human("alice"), MatchKind::PlayerVsAi)
            .unwrap_err(),
        GameError::AlreadyActive("alice".into())
    );

    let other = reg.create_match(Participant::human("bob"), MatchKind::PlayerVsPlayer).unwrap();
    assert_eq!(
        reg.join_match(handle.id(), "bob").unwrap_err(),
        GameError::AlreadyActive("bob".into())
    );
    assert_eq!(reg.match_of("bob"), Some(other.id()));
    assert_eq!(handle.lock().phase(), &Phase::AwaitingOpponent);
}

#[test]
fn test_join_errors() {
    let reg = registry(4);
    let missing = MatchId::new();
    assert_eq!(
        reg.join_match(missing, "bob").unwrap_err(),
        GameError::NotFound(missing)
    );

    let ai = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsAi).unwrap();
    assert!(matches!(
        reg.join_match(ai.id(), "bob"),
        Err(GameError::InvalidState(_))
    ));

    let pvp = reg.create_match(Participant::human("carol"), MatchKind::PlayerVsPlayer).unwrap();
    reg.join_match(pvp.id(), "dave").unwrap();
    assert!(matches!(
        reg.join_match(pvp.id(), "erin"),
        Err(GameError::InvalidState(_))
    ));
    assert!(!reg.is_participant_active("erin"));
    assert!(!reg.is_participant_active("bob"));
}

#[test]
fn test_finish_unbinds_and_allows_new_match() {
    let reg = registry(2);
    let handle = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    reg.join_match(handle.id(), "bob").unwrap();
    reg.finish_match(
        handle.id(),
        Outcome {
            winner: "bob".into(),
            loser: "alice".into(),
        },
    )
    .unwrap();
    assert!(!reg.is_participant_active("alice"));
    assert!(!reg.is_participant_active("bob"));
    assert!(matches!(handle.lock().phase(), Phase::Finished(_)));

    // still stored until evicted, and it counts against capacity
    assert_eq!(reg.count_active(), 1);
    reg.create_match(Participant::human("alice"), MatchKind::PlayerVsAi).unwrap();
    assert!(matches!(
        reg.create_match(Participant::human("bob"), MatchKind::PlayerVsAi),
        Err(GameError::CapacityExceeded { .. })
    ));
}

#[test]
fn test_cancel_twice_fails_and_keeps_schedule() {
    let reg = registry(4);
    let handle = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    reg.cancel_match(handle.id()).unwrap();
    assert!(matches!(
        reg.cancel_match(handle.id()),
        Err(GameError::InvalidState(_))
    ));
    assert!(!reg.is_participant_active("alice"));
}

#[test]
fn test_eviction_waits_for_grace_window() {
    let reg = registry(4);
    let done = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    let live = reg.create_match(Participant::human("bob"), MatchKind::PlayerVsPlayer).unwrap();
    reg.cancel_match(done.id()).unwrap();

    assert_eq!(reg.evict_expired(Instant::now()), 0);
    assert!(reg.get(done.id()).is_ok());

    assert_eq!(reg.evict_expired(Instant::now() + Duration::from_secs(61)), 1);
    assert_eq!(reg.get(done.id()).unwrap_err(), GameError::NotFound(done.id()));
    assert!(reg.get(live.id()).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_eviction_runs_on_runtime() {
    let reg = registry(4);
    let handle = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    reg.cancel_match(handle.id()).unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(reg.count_active(), 1);
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(reg.count_active(), 0);
}

#[test]
fn test_list_waiting_and_stats() {
    let reg = registry(5);
    let waiting = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    reg.create_match(Participant::human("bob"), MatchKind::PlayerVsAi).unwrap();
    let joined = reg.create_match(Participant::human("carol"), MatchKind::PlayerVsPlayer).unwrap();
    reg.join_match(joined.id(), "dave").unwrap();

    let list = reg.list_waiting();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].id, waiting.id());
    assert_eq!(list[0].players, vec!["alice".to_string()]);
    assert!(list[0].waiting_for.is_some());
    assert_eq!(reg.list_active().len(), 3);

    let stats = reg.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.awaiting_opponent, 1);
    assert_eq!(stats.placing_ships, 2);
    assert_eq!(stats.player_vs_ai, 1);
    assert_eq!(stats.player_vs_player, 2);
    assert_eq!(stats.bound_participants, 4);
    assert!(stats.healthy);
}

#[test]
fn test_concurrent_join_has_one_winner() {
    let reg = registry(32);
    let handle = reg.create_match(Participant::human("host"), MatchKind::PlayerVsPlayer).unwrap();
    let id = handle.id();

    let results: Vec<_> = std::thread::scope(|s| {
        let joins: Vec<_> = (0..16)
            .map(|n| {
                let reg = &reg;
                s.spawn(move || reg.join_match(id, &format!("guest{n}")))
            })
            .collect();
        joins.into_iter().map(|j| j.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, GameError::InvalidState(_))));
    let bound: Vec<_> = (0..16)
        .filter(|n| reg.is_participant_active(&format!("guest{n}")))
        .collect();
    assert_eq!(bound.len(), 1);
}

#[test]
fn test_concurrent_create_respects_capacity() {
    let reg = registry(3);
    let created: usize = std::thread::scope(|s| {
        let tasks: Vec<_> = (0..12)
            .map(|n| {
                let reg = &reg;
                s.spawn(move || {
                    reg.create_match(Participant::human(format!("p{n}")), MatchKind::PlayerVsAi)
                        .is_ok() as usize
                })
            })
            .collect();
        tasks.into_iter().map(|t| t.join().unwrap()).sum()
    });
    assert_eq!(created, 3);
    assert_eq!(reg.count_active(), 3);
}

#[test]
fn test_busy_match_does_not_stall_others() {
    let reg = registry(4);
    let busy = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    let other = reg.create_match(Participant::human("carol"), MatchKind::PlayerVsPlayer).unwrap();
    let (busy_id, other_id) = (busy.id(), other.id());

    let guard = busy.lock();
    std::thread::scope(|s| {
        let reg = &reg;
        let joiner = s.spawn(move || reg.join_match(busy_id, "bob"));
        std::thread::sleep(Duration::from_millis(50));

        let (tx, rx) = std::sync::mpsc::channel();
        s.spawn(move || {
            let found = reg.get(other_id).is_ok();
            let joined = reg.join_match(other_id, "dave").is_ok();
            let _ = tx.send((found, joined, reg.count_active()));
        });
        let progressed = rx.recv_timeout(Duration::from_secs(2));
        let join_pending = !joiner.is_finished();
        drop(guard);

        assert_eq!(progressed, Ok((true, true, 2)));
        assert!(join_pending);
        assert!(joiner.join().unwrap().is_ok());
    });
    assert_eq!(reg.match_of("bob"), Some(busy_id));
    assert_eq!(reg.match_of("dave"), Some(other_id));
}

#[test]
fn test_retire_on_busy_match_does_not_stall_others() {
    let reg = registry(4);
    let busy = reg.create_match(Participant::human("alice"), MatchKind::PlayerVsPlayer).unwrap();
    let busy_id = busy.id();

    let guard = busy.lock();
    std::thread::scope(|s| {
        let reg = &reg;
        let cancel = s.spawn(move || reg.cancel_match(busy_id));
        std::thread::sleep(Duration::from_millis(50));

        let (tx, rx) = std::sync::mpsc::channel();
        s.spawn(move || {
            let created = reg
                .create_match(Participant::human("erin"), MatchKind::PlayerVsAi)
                .is_ok();
            let _ = tx.send(created);
        });
        let progressed = rx.recv_timeout(Duration::from_secs(2));
        drop(guard);

        assert_eq!(progressed, Ok(true));
        assert!(cancel.join().unwrap().is_ok());
    });
    assert!(!reg.is_participant_active("alice"));
    assert!(reg.is_participant_active("erin"));
}
