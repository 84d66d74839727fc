//! The game session manager.
//!
//! A [`GameSession`] owns one game's [`GameAggregate`] and applies every
//! host operation as load, validate, persist, update memory, broadcast.
//! Memory only changes after the matching store call succeeded, so a
//! failure never leaves the aggregate ahead of storage. Failures never
//! broadcast.
//!
//! # Lifecycle
//!
//! ```text
//! Pending --start--> Active(Day 1) --phase--> Night --phase--> Day 2 ...
//!                       |
//!                       +--win / jester vote / manual finish--> Finished
//! ```

use std::sync::Arc;

use mafia_db::GameStore;
use mafia_types::{
    ActionRequest, AliveView, AssignRolesRequest, GameAction, GameAggregate, GameChanges,
    GameEventMessage, GameId, GamePhase, GameSnapshot, GameStatus, NewLog, NightActionsRequest,
    PlayerChanges, PlayerId, UserId,
};
use serde_json::json;

use crate::broadcast::BroadcastHub;
use crate::error::GameError;
use crate::rules;

/// Event names pushed to live subscribers.
pub mod events {
    /// Initial snapshot sent to a newly connected subscriber.
    pub const INIT: &str = "init";
    /// A game was created.
    pub const GAME_CREATED: &str = "game_created";
    /// Roles were assigned.
    pub const ROLES_ASSIGNED: &str = "roles_assigned";
    /// The game started.
    pub const GAME_STARTED: &str = "game_started";
    /// A single action was processed.
    pub const GAME_ACTION: &str = "game_action";
    /// A batch of night actions was processed.
    pub const NIGHT_ACTIONS_RESOLVED: &str = "night_actions_resolved";
    /// The phase changed.
    pub const PHASE_CHANGED: &str = "phase_changed";
    /// The game was finished manually.
    pub const GAME_FINISHED: &str = "game_finished";
    /// Hidden deaths were revealed.
    pub const NIGHT_SYNCED: &str = "night_synced";
}

/// One game's in-memory state plus the collaborators needed to mutate it.
pub struct GameSession {
    aggregate: GameAggregate,
    store: Arc<dyn GameStore>,
    hub: Arc<BroadcastHub>,
}

impl GameSession {
    /// Wrap an already loaded aggregate.
    pub fn new(aggregate: GameAggregate, store: Arc<dyn GameStore>, hub: Arc<BroadcastHub>) -> Self {
        Self {
            aggregate,
            store,
            hub,
        }
    }

    /// Load a game from the store.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotFound`] if the game does not exist.
    pub async fn load(
        game_id: GameId,
        store: Arc<dyn GameStore>,
        hub: Arc<BroadcastHub>,
    ) -> Result<Self, GameError> {
        let aggregate = store
            .get_game_bundle(game_id)
            .await?
            .ok_or_else(GameError::game_not_found)?;
        Ok(Self::new(aggregate, store, hub))
    }

    /// The game ID.
    pub const fn id(&self) -> GameId {
        self.aggregate.game.id
    }

    /// Read-only access to the current aggregate.
    pub const fn aggregate(&self) -> &GameAggregate {
        &self.aggregate
    }

    /// Fail unless `caller` hosts this game.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Forbidden`] for any other user.
    pub fn ensure_host(&self, caller: UserId) -> Result<(), GameError> {
        if self.aggregate.host_id() == caller {
            Ok(())
        } else {
            Err(GameError::Forbidden("Not permitted for this game".to_owned()))
        }
    }

    /// Project the current state.
    pub fn snapshot(&self, view: AliveView) -> GameSnapshot {
        GameSnapshot::from_aggregate(&self.aggregate, view)
    }

    fn host_snapshot(&self) -> GameSnapshot {
        self.snapshot(AliveView::Authoritative)
    }

    /// Publish the public view under `event`, with optional extra fields.
    pub fn broadcast(&self, event: &str, extra: Option<(&str, serde_json::Value)>) {
        let mut message = GameEventMessage::new(event, self.snapshot(AliveView::Public));
        if let Some((key, value)) = extra {
            message = message.with_field(key, value);
        }
        self.hub.publish(self.id(), message);
    }

    fn require_status(&self, status: GameStatus, message: &str) -> Result<(), GameError> {
        if self.aggregate.game.status == status {
            Ok(())
        } else {
            Err(GameError::BadRequest(message.to_owned()))
        }
    }

    fn log_now(&self, message: impl Into<String>) -> NewLog {
        NewLog::now(
            self.aggregate.game.current_round,
            self.aggregate.game.current_phase,
            message,
        )
    }

    /// Apply `changes` and append `log` in one atomic store call.
    async fn commit(&mut self, changes: &GameChanges, log: NewLog, failure: &str) -> Result<(), GameError> {
        let (game, log) = self
            .store
            .update_game_with_log(self.id(), changes, log)
            .await?
            .ok_or_else(|| GameError::Internal(failure.to_owned()))?;
        self.aggregate.game = game;
        self.aggregate.push_log(log);
        Ok(())
    }

    async fn append_log(&mut self, log: NewLog) -> Result<(), GameError> {
        let log = self.store.add_log(self.id(), log).await?;
        self.aggregate.push_log(log);
        Ok(())
    }

    async fn update_player(
        &mut self,
        player_id: PlayerId,
        changes: &PlayerChanges,
    ) -> Result<(), GameError> {
        let player = self
            .store
            .update_player(player_id, self.id(), changes)
            .await?
            .ok_or_else(GameError::player_not_found)?;
        self.aggregate.upsert_player(player);
        Ok(())
    }

    /// Write the authoritative alive flag, and the public one too when
    /// the game reveals deaths immediately.
    async fn set_alive(&mut self, player_id: PlayerId, alive: bool) -> Result<(), GameError> {
        let changes = PlayerChanges {
            is_alive: Some(alive),
            public_is_alive: self.aggregate.game.auto_sync_alive.then_some(alive),
            ..PlayerChanges::default()
        };
        self.update_player(player_id, &changes).await
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Assign roles to players of this game.
    ///
    /// Assignments are persisted one by one; on the first unknown player
    /// the earlier ones stay applied and nothing is broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] naming the first player that is
    /// not seated in this game.
    pub async fn assign_roles(
        &mut self,
        request: &AssignRolesRequest,
    ) -> Result<GameSnapshot, GameError> {
        for assignment in &request.assignments {
            if self.aggregate.player(assignment.player_id).is_none() {
                return Err(GameError::BadRequest(format!(
                    "Invalid player {}",
                    assignment.player_id
                )));
            }
            let changes = PlayerChanges {
                role: Some(assignment.role.clone()),
                ..PlayerChanges::default()
            };
            self.update_player(assignment.player_id, &changes).await?;
        }
        tracing::debug!(game_id = %self.id(), count = request.assignments.len(), "Assigned roles");
        self.broadcast(events::ROLES_ASSIGNED, None);
        Ok(self.host_snapshot())
    }

    /// Start a pending game at Day 1.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] unless the game is pending.
    pub async fn start_game(&mut self) -> Result<GameSnapshot, GameError> {
        self.require_status(GameStatus::Pending, "Game already started")?;
        let changes = GameChanges {
            status: Some(GameStatus::Active),
            current_phase: Some(GamePhase::Day),
            current_round: Some(1),
            winning_team: None,
        };
        let log = NewLog::now(1, GamePhase::Day, "Game started");
        self.commit(&changes, log, "Failed to update game state").await?;
        tracing::info!(game_id = %self.id(), "Game started");
        self.broadcast(events::GAME_STARTED, None);
        Ok(self.host_snapshot())
    }

    /// Apply one action without broadcasting.
    ///
    /// Writes exactly one log entry for the action, then finishes the game
    /// if the vote hit the Jester or a team has won. Returns whether the
    /// game is now finished.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] if the game is not active and
    /// [`GameError::NotFound`] if the target is not in this game (or, for
    /// a vote, is already dead).
    pub async fn process_action(&mut self, action: &GameAction) -> Result<bool, GameError> {
        self.require_status(GameStatus::Active, "Game not active")?;
        let target = action.target();
        let player = self
            .aggregate
            .player(target.player_id)
            .cloned()
            .ok_or_else(GameError::player_not_found)?;

        let mut jester_voted_out = false;
        let default_message = match action {
            GameAction::Vote(_) => {
                if !player.is_alive {
                    return Err(GameError::player_not_found());
                }
                self.set_alive(player.id, false).await?;
                jester_voted_out = rules::is_jester(player.role.as_deref());
                format!("{} was voted out.", player.name)
            }
            GameAction::Kill(_) => {
                self.set_alive(player.id, false).await?;
                format!("{} was killed during the night.", player.name)
            }
            GameAction::Save(_) => {
                self.set_alive(player.id, true).await?;
                format!("{} was saved by the doctor.", player.name)
            }
            GameAction::Investigate(_) => {
                let role = player
                    .role
                    .as_deref()
                    .filter(|r| !r.is_empty())
                    .unwrap_or("Unknown");
                format!("Detective investigated {}: {role}.", player.name)
            }
        };
        let message = target.note.clone().unwrap_or(default_message);
        tracing::debug!(
            game_id = %self.id(),
            player_id = %player.id,
            action = %action.kind(),
            "Processing action"
        );

        if jester_voted_out {
            let log = self.log_now(message);
            self.commit(&GameChanges::finish(rules::JESTER), log, "Failed to update game state")
                .await?;
            tracing::info!(game_id = %self.id(), winner = rules::JESTER, "Game finished");
            return Ok(true);
        }

        self.append_log(self.log_now(message)).await?;

        if let Some(winner) = rules::determine_winner(&self.aggregate.players) {
            let log = self.log_now(format!("Game ended. {winner} win!"));
            self.commit(&GameChanges::finish(winner), log, "Failed to update game state")
                .await?;
            tracing::info!(game_id = %self.id(), winner, "Game finished");
            return Ok(true);
        }
        Ok(self.aggregate.game.status == GameStatus::Finished)
    }

    /// Convert and apply a single wire action, then broadcast it.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] for an unknown kind or a missing
    /// target, plus any error of [`Self::process_action`].
    pub async fn handle_action(&mut self, request: &ActionRequest) -> Result<GameSnapshot, GameError> {
        self.require_status(GameStatus::Active, "Game not active")?;
        let action = GameAction::try_from(request)?;
        self.process_action(&action).await?;
        self.broadcast(
            events::GAME_ACTION,
            Some(("action", json!(action.kind().as_str()))),
        );
        Ok(self.host_snapshot())
    }

    /// Apply a batch of night actions in order, stopping once the game
    /// finishes.
    ///
    /// The whole batch is validated before anything is applied.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] outside an active night, for an
    /// empty batch, or if any entry is a vote or malformed, and
    /// [`GameError::NotFound`] if any target is not seated in this game.
    /// Nothing is applied unless the whole batch is valid.
    pub async fn apply_night_actions(
        &mut self,
        request: &NightActionsRequest,
    ) -> Result<GameSnapshot, GameError> {
        self.require_status(GameStatus::Active, "Game not active")?;
        if self.aggregate.game.current_phase != GamePhase::Night {
            return Err(GameError::BadRequest(
                "Night actions only allowed during night phase".to_owned(),
            ));
        }
        if request.actions.is_empty() {
            return Err(GameError::BadRequest(
                "At least one night action is required".to_owned(),
            ));
        }
        let actions = request
            .actions
            .iter()
            .map(|wire| match GameAction::try_from(wire)? {
                GameAction::Vote(_) => Err(GameError::BadRequest(
                    "Votes are not allowed in night actions".to_owned(),
                )),
                action if self.aggregate.player(action.target().player_id).is_none() => {
                    Err(GameError::player_not_found())
                }
                action => Ok(action),
            })
            .collect::<Result<Vec<_>, GameError>>()?;

        for action in &actions {
            if self.process_action(action).await? {
                break;
            }
        }
        self.broadcast(
            events::NIGHT_ACTIONS_RESOLVED,
            Some(("actions", json!(request.actions))),
        );
        Ok(self.host_snapshot())
    }

    /// Switch between day and night. Night to day starts a new round.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] unless the game is active.
    pub async fn change_phase(&mut self, phase: GamePhase) -> Result<GameSnapshot, GameError> {
        self.require_status(GameStatus::Active, "Game is not active")?;
        let mut round = self.aggregate.game.current_round;
        if self.aggregate.game.current_phase == GamePhase::Night && phase == GamePhase::Day {
            round = round.saturating_add(1);
        }
        let changes = GameChanges {
            current_phase: Some(phase),
            current_round: Some(round),
            ..GameChanges::default()
        };
        let log = NewLog::now(round, phase, format!("Phase switched to {} {round}", phase.label()));
        self.commit(&changes, log, "Failed to change phase").await?;
        tracing::debug!(game_id = %self.id(), %phase, round, "Phase changed");
        self.broadcast(events::PHASE_CHANGED, None);
        Ok(self.host_snapshot())
    }

    /// Finish the game with the host's chosen winner.
    ///
    /// Finishing an already finished game changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GameError`] if the store update fails.
    pub async fn finish_game(&mut self, winning_team: &str) -> Result<GameSnapshot, GameError> {
        if self.aggregate.game.status == GameStatus::Finished {
            return Ok(self.host_snapshot());
        }
        let log = self.log_now(format!("Game finished manually. Winner: {winning_team}"));
        self.commit(&GameChanges::finish(winning_team), log, "Failed to finish game")
            .await?;
        tracing::info!(game_id = %self.id(), winner = winning_team, "Game finished manually");
        self.broadcast(events::GAME_FINISHED, None);
        Ok(self.host_snapshot())
    }

    /// Reveal every hidden alive change to the public view.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::BadRequest`] unless the game is active.
    pub async fn sync_night_events(&mut self) -> Result<GameSnapshot, GameError> {
        self.require_status(GameStatus::Active, "Game is not active")?;
        let pending: Vec<(PlayerId, bool)> = self
            .aggregate
            .players
            .iter()
            .filter(|p| p.public_is_alive != p.is_alive)
            .map(|p| (p.id, p.is_alive))
            .collect();

        for &(player_id, alive) in &pending {
            let changes = PlayerChanges {
                public_is_alive: Some(alive),
                ..PlayerChanges::default()
            };
            self.update_player(player_id, &changes).await?;
        }
        self.append_log(self.log_now("Night events synced to public view."))
            .await?;

        let revealed: Vec<PlayerId> = pending.into_iter().map(|(id, _)| id).collect();
        tracing::debug!(game_id = %self.id(), revealed = revealed.len(), "Night events synced");
        self.broadcast(events::NIGHT_SYNCED, Some(("revealed_player_ids", json!(revealed))));
        Ok(self.host_snapshot())
    }
}
