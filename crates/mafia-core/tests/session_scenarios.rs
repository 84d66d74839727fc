//! End-to-end game scenarios against the in-memory store.
//!
//! Each test drives a game through [`GameService`] exactly as the HTTP
//! layer does: lock the session, run one operation, release.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::too_many_lines,
    clippy::indexing_slicing
)]

use std::sync::Arc;

use mafia_core::{BroadcastHub, ErrorKind, GameService, GameSession, events};
use mafia_db::{GameStore, MemoryStore};
use mafia_types::{
    ActionRequest, AliveView, AssignRolesRequest, CreateGameRequest, GameId, GamePhase,
    GameSnapshot, GameStatus, NewFriend, NightActionsRequest, PlayerId, PlayerSpec,
    RoleAssignment, UserId,
};
use tokio::sync::OwnedMutexGuard;

struct Table {
    service: GameService,
    store: Arc<dyn GameStore>,
    host: UserId,
}

async fn table() -> Table {
    let store: Arc<dyn GameStore> = Arc::new(MemoryStore::new());
    let host = store.create_user("host", "hash").await.unwrap().id;
    let service = GameService::new(Arc::clone(&store), Arc::new(BroadcastHub::new()), true);
    Table {
        service,
        store,
        host,
    }
}

impl Table {
    async fn session(&self, game_id: GameId) -> OwnedMutexGuard<GameSession> {
        self.service.session(game_id, Some(self.host)).await.unwrap()
    }

    /// Create a four-seat game, assign `roles` in seat order and start it.
    async fn started_game(&self, roles: [&str; 4], auto_sync: bool) -> GameSnapshot {
        let request = CreateGameRequest {
            player_names: ["Alice", "Bob", "Cara", "Dylan"].map(str::to_owned).to_vec(),
            auto_sync_alive: Some(auto_sync),
            ..CreateGameRequest::default()
        };
        let created = self.service.create_game(self.host, &request).await.unwrap();
        let assignments = created
            .players
            .iter()
            .zip(roles)
            .map(|(p, role)| RoleAssignment {
                player_id: p.id,
                role: role.to_owned(),
            })
            .collect();
        let mut session = self.session(created.game_id).await;
        session
            .assign_roles(&AssignRolesRequest { assignments })
            .await
            .unwrap();
        session.start_game().await.unwrap()
    }
}

fn seat(snapshot: &GameSnapshot, name: &str) -> PlayerId {
    snapshot
        .players
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.id)
        .unwrap()
}

fn action(kind: &str, target: PlayerId) -> ActionRequest {
    ActionRequest {
        action_type: kind.to_owned(),
        target_player_id: Some(target),
        note: None,
    }
}

fn messages(snapshot: &GameSnapshot) -> Vec<&str> {
    snapshot.logs.iter().map(|l| l.message.as_str()).collect()
}

fn alive(snapshot: &GameSnapshot, id: PlayerId) -> bool {
    snapshot.players.iter().find(|p| p.id == id).unwrap().is_alive
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn standard_four_player_game_ends_with_villagers() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Detective", "Doctor", "Villager"], true)
        .await;
    assert_eq!(game.status, GameStatus::Active);
    assert_eq!((game.phase, game.round), (GamePhase::Day, 1));
    let (alice, cara) = (seat(&game, "Alice"), seat(&game, "Cara"));

    let mut s = t.session(game.game_id).await;
    s.change_phase(GamePhase::Night).await.unwrap();
    s.apply_night_actions(&NightActionsRequest {
        actions: vec![action("kill", cara), action("investigate", alice)],
    })
    .await
    .unwrap();
    let day = s.change_phase(GamePhase::Day).await.unwrap();
    assert_eq!(day.round, 2);
    assert_eq!(day.status, GameStatus::Active);

    let end = s.handle_action(&action("VOTE", alice)).await.unwrap();
    assert_eq!(end.status, GameStatus::Finished);
    assert_eq!(end.winning_team.as_deref(), Some("Villagers"));
    assert_eq!(
        messages(&end),
        vec![
            "Game started",
            "Phase switched to Night 1",
            "Cara was killed during the night.",
            "Detective investigated Alice: Mafia.",
            "Phase switched to Day 2",
            "Alice was voted out.",
            "Game ended. Villagers win!",
        ]
    );
    drop(s);

    let stored = t.store.get_game(game.game_id).await.unwrap().unwrap();
    assert_eq!(stored.status, GameStatus::Finished);
    assert_eq!(t.store.list_logs(game.game_id).await.unwrap().len(), 7);
}

#[tokio::test]
async fn voting_out_the_jester_wins_for_the_jester() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "jester", "Villager", "Villager"], true)
        .await;
    let bob = seat(&game, "Bob");

    let mut s = t.session(game.game_id).await;
    let before = s.aggregate().logs.len();
    let end = s.handle_action(&action("vote", bob)).await.unwrap();

    assert_eq!(end.status, GameStatus::Finished);
    assert_eq!(end.winning_team.as_deref(), Some("Jester"));
    assert!(!alive(&end, bob));
    assert_eq!(end.logs.len(), before + 1);
    assert_eq!(messages(&end).last(), Some(&"Bob was voted out."));
}

#[tokio::test]
async fn night_batch_stops_once_mafia_reach_parity() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let (bob, cara, dylan) = (seat(&game, "Bob"), seat(&game, "Cara"), seat(&game, "Dylan"));

    let mut s = t.session(game.game_id).await;
    s.change_phase(GamePhase::Night).await.unwrap();
    let end = s
        .apply_night_actions(&NightActionsRequest {
            actions: vec![action("kill", bob), action("kill", cara), action("kill", dylan)],
        })
        .await
        .unwrap();

    assert_eq!(end.winning_team.as_deref(), Some("Mafia"));
    assert!(alive(&end, dylan));
    assert_eq!(messages(&end).last(), Some(&"Game ended. Mafia win!"));
}

#[tokio::test]
async fn notes_replace_default_messages_and_save_revives() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Doctor", "Villager", "Villager"], true)
        .await;
    let dylan = seat(&game, "Dylan");

    let mut s = t.session(game.game_id).await;
    s.change_phase(GamePhase::Night).await.unwrap();
    let killed = s
        .handle_action(&ActionRequest {
            note: Some("Dylan was found in the library.".to_owned()),
            ..action("kill", dylan)
        })
        .await
        .unwrap();
    assert!(!alive(&killed, dylan));
    assert_eq!(messages(&killed).last(), Some(&"Dylan was found in the library."));

    let saved = s.handle_action(&action("save", dylan)).await.unwrap();
    assert!(alive(&saved, dylan));
    assert_eq!(messages(&saved).last(), Some(&"Dylan was saved by the doctor."));
}

#[tokio::test]
async fn rounds_only_advance_from_night_to_day() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let mut s = t.session(game.game_id).await;

    let steps = [
        (GamePhase::Day, 1),
        (GamePhase::Night, 1),
        (GamePhase::Night, 1),
        (GamePhase::Day, 2),
        (GamePhase::Night, 2),
        (GamePhase::Day, 3),
    ];
    for (phase, round) in steps {
        let snap = s.change_phase(phase).await.unwrap();
        assert_eq!((snap.phase, snap.round), (phase, round));
    }
    assert_eq!(
        messages(&s.snapshot(AliveView::Authoritative)).last(),
        Some(&"Phase switched to Day 3")
    );
}

#[tokio::test]
async fn deferred_policy_hides_deaths_until_sync() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], false)
        .await;
    let dylan = seat(&game, "Dylan");
    let mut rx = t.service.hub().subscribe(game.game_id);

    let mut s = t.session(game.game_id).await;
    s.change_phase(GamePhase::Night).await.unwrap();
    let host_view = s.handle_action(&action("kill", dylan)).await.unwrap();
    assert!(!alive(&host_view, dylan));

    let phase_msg = rx.recv().await.unwrap();
    assert_eq!(phase_msg.event, events::PHASE_CHANGED);
    let action_msg = rx.recv().await.unwrap();
    assert_eq!(action_msg.event, events::GAME_ACTION);
    assert_eq!(action_msg.extra.get("action"), Some(&serde_json::json!("kill")));
    assert!(alive(&action_msg.snapshot, dylan));

    s.sync_night_events().await.unwrap();
    let synced = rx.recv().await.unwrap();
    assert_eq!(synced.event, events::NIGHT_SYNCED);
    assert!(!alive(&synced.snapshot, dylan));
    assert_eq!(
        synced.extra.get("revealed_player_ids"),
        Some(&serde_json::json!([dylan]))
    );
    assert_eq!(
        messages(&synced.snapshot).last(),
        Some(&"Night events synced to public view.")
    );
}

#[tokio::test]
async fn manual_finish_is_idempotent() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let mut s = t.session(game.game_id).await;

    let first = s.finish_game("Villagers").await.unwrap();
    assert_eq!(first.status, GameStatus::Finished);
    assert_eq!(
        messages(&first).last(),
        Some(&"Game finished manually. Winner: Villagers")
    );

    let again = s.finish_game("Mafia").await.unwrap();
    assert_eq!(again, first);
}

// =============================================================================
// Rejections
// =============================================================================

#[tokio::test]
async fn lifecycle_preconditions_are_enforced() {
    let t = table().await;
    let created = t
        .service
        .create_game(
            t.host,
            &CreateGameRequest {
                player_names: vec!["Alice".to_owned(), "Bob".to_owned()],
                ..CreateGameRequest::default()
            },
        )
        .await
        .unwrap();
    let alice = seat(&created, "Alice");
    let mut s = t.session(created.game_id).await;

    let err = s.handle_action(&action("kill", alice)).await.unwrap_err();
    assert_eq!(err.to_string(), "Game not active");
    let err = s.change_phase(GamePhase::Night).await.unwrap_err();
    assert_eq!(err.to_string(), "Game is not active");
    let err = s.sync_night_events().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    s.start_game().await.unwrap();
    let err = s.start_game().await.unwrap_err();
    assert_eq!(err.to_string(), "Game already started");

    let err = s.handle_action(&action("dance", alice)).await.unwrap_err();
    assert_eq!(err.to_string(), "Unsupported action type");
    let err = s
        .handle_action(&ActionRequest {
            target_player_id: None,
            ..action("kill", alice)
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "kill requires a target");

    let err = s
        .handle_action(&action("kill", PlayerId::new(999)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Player not found");

    let err = s
        .apply_night_actions(&NightActionsRequest {
            actions: vec![action("kill", alice)],
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Night actions only allowed during night phase");
}

#[tokio::test]
async fn dead_players_cannot_be_voted_out() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let dylan = seat(&game, "Dylan");
    let mut s = t.session(game.game_id).await;

    s.handle_action(&action("kill", dylan)).await.unwrap();
    let err = s.handle_action(&action("vote", dylan)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn invalid_night_batches_apply_nothing() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let (bob, cara) = (seat(&game, "Bob"), seat(&game, "Cara"));
    let mut s = t.session(game.game_id).await;
    let night = s.change_phase(GamePhase::Night).await.unwrap();

    let err = s
        .apply_night_actions(&NightActionsRequest {
            actions: vec![action("kill", bob), action("vote", cara)],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = s
        .apply_night_actions(&NightActionsRequest { actions: Vec::new() })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let mut rx = t.service.hub().subscribe(game.game_id);
    let err = s
        .apply_night_actions(&NightActionsRequest {
            actions: vec![action("kill", bob), action("kill", PlayerId::new(9999))],
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(rx.try_recv().is_err());

    assert_eq!(s.snapshot(AliveView::Authoritative), night);
    assert!(alive(&night, bob));
    let stored_bob = t.store.get_player(game.game_id, bob).await.unwrap().unwrap();
    assert!(stored_bob.is_alive);
    let stored_logs = t.store.list_logs(game.game_id).await.unwrap();
    assert_eq!(stored_logs.len(), night.logs.len());
}

#[tokio::test]
async fn unknown_players_in_role_assignment_are_rejected() {
    let t = table().await;
    let created = t
        .service
        .create_game(
            t.host,
            &CreateGameRequest {
                player_names: vec!["Alice".to_owned()],
                ..CreateGameRequest::default()
            },
        )
        .await
        .unwrap();
    let alice = seat(&created, "Alice");
    let mut s = t.session(created.game_id).await;

    let err = s
        .assign_roles(&AssignRolesRequest {
            assignments: vec![
                RoleAssignment {
                    player_id: alice,
                    role: "Doctor".to_owned(),
                },
                RoleAssignment {
                    player_id: PlayerId::new(999),
                    role: "Mafia".to_owned(),
                },
            ],
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid player 999");
    let alice_now = s.aggregate().player(alice).unwrap();
    assert_eq!(alice_now.role.as_deref(), Some("Doctor"));
}

#[tokio::test]
async fn only_the_host_may_touch_a_game() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let stranger = t.store.create_user("stranger", "hash").await.unwrap().id;

    let err = t
        .service
        .session(game.game_id, Some(stranger))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = t
        .service
        .snapshot(game.game_id, Some(stranger), AliveView::Authoritative)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = t
        .service
        .session(GameId::new(404), Some(t.host))
        .await
        .err()
        .unwrap();
    assert_eq!(err.to_string(), "Game not found");
}

// =============================================================================
// Creation
// =============================================================================

#[tokio::test]
async fn friends_supply_names_and_avatars() {
    let t = table().await;
    let friend = t
        .store
        .create_friend(
            t.host,
            NewFriend {
                name: " Frida ".to_owned(),
                description: None,
                image: Some("frida.png".to_owned()),
            },
        )
        .await
        .unwrap();

    let created = t
        .service
        .create_game(
            t.host,
            &CreateGameRequest {
                players: vec![
                    PlayerSpec {
                        name: "ignored".to_owned(),
                        friend_id: Some(friend.id),
                        avatar: None,
                    },
                    PlayerSpec {
                        name: "   ".to_owned(),
                        ..PlayerSpec::default()
                    },
                    PlayerSpec {
                        name: " Gus ".to_owned(),
                        avatar: Some("🦖".to_owned()),
                        friend_id: None,
                    },
                    PlayerSpec {
                        name: "Hana".to_owned(),
                        ..PlayerSpec::default()
                    },
                ],
                player_names: vec!["unused".to_owned()],
                auto_sync_alive: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(created.status, GameStatus::Pending);
    assert!(created.auto_sync_alive);
    let seats: Vec<(&str, Option<&str>)> = created
        .players
        .iter()
        .map(|p| (p.name.as_str(), p.avatar.as_deref()))
        .collect();
    assert_eq!(seats[0], ("Frida", Some("frida.png")));
    assert_eq!(seats[1], ("Gus", Some("🦖")));
    assert_eq!(seats[2].0, "Hana");
    assert!(mafia_core::ANIMAL_AVATARS.contains(&seats[2].1.unwrap()));
    assert_eq!(created.players[0].friend_id, Some(friend.id));
    assert_eq!(seats.len(), 3);
}

#[tokio::test]
async fn friends_of_other_users_are_rejected() {
    let t = table().await;
    let other = t.store.create_user("other", "hash").await.unwrap().id;
    let friend = t
        .store
        .create_friend(
            other,
            NewFriend {
                name: "Ivy".to_owned(),
                ..NewFriend::default()
            },
        )
        .await
        .unwrap();

    let err = t
        .service
        .create_game(
            t.host,
            &CreateGameRequest {
                players: vec![PlayerSpec {
                    name: "Ivy".to_owned(),
                    friend_id: Some(friend.id),
                    avatar: None,
                }],
                ..CreateGameRequest::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid friend selection");
}

#[tokio::test]
async fn games_list_newest_first_with_status_filter() {
    let t = table().await;
    let first = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let second = t
        .service
        .create_game(t.host, &CreateGameRequest::default())
        .await
        .unwrap();

    let all = t.service.list_games(t.host, None).await.unwrap();
    assert_eq!(
        all.iter().map(|g| g.id).collect::<Vec<_>>(),
        vec![second.game_id, first.game_id]
    );
    let active = t
        .service
        .list_games(t.host, Some(GameStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, first.game_id);
}

// =============================================================================
// Registry
// =============================================================================

#[tokio::test]
async fn concurrent_first_access_shares_one_session() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let registry = Arc::clone(t.service.registry());
    assert!(registry.evict(game.game_id).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_load(game.game_id).await.unwrap() })
        })
        .collect();
    let mut sessions = Vec::new();
    for handle in handles {
        sessions.push(handle.await.unwrap());
    }
    assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    assert_eq!(registry.len().await, 1);

    let reloaded = sessions[0].lock().await.snapshot(AliveView::Authoritative);
    assert_eq!(reloaded, game);
}

#[tokio::test]
async fn finished_games_leave_the_registry_and_reload() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let registry = Arc::clone(t.service.registry());

    let s = t.session(game.game_id).await;
    assert!(!t.service.release(s).await);
    assert_eq!(registry.len().await, 1);

    let mut s = t.session(game.game_id).await;
    let finished = s.finish_game("Mafia").await.unwrap();
    assert!(t.service.release(s).await);
    assert!(registry.is_empty().await);

    let reloaded = t.session(game.game_id).await;
    assert_eq!(reloaded.snapshot(AliveView::Authoritative), finished);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn read_snapshots_follow_writes() {
    let t = table().await;
    let game = t
        .started_game(["Mafia", "Villager", "Villager", "Villager"], true)
        .await;
    let cached = t
        .service
        .snapshot(game.game_id, Some(t.host), AliveView::Authoritative)
        .await
        .unwrap();
    assert_eq!(cached, game);

    t.session(game.game_id)
        .await
        .change_phase(GamePhase::Night)
        .await
        .unwrap();
    let fresh = t
        .service
        .snapshot(game.game_id, None, AliveView::Public)
        .await
        .unwrap();
    assert_eq!(fresh.phase, GamePhase::Night);
}
