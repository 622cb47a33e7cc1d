//! Session lifecycle and matchmaking
//!
//! The lobby owns every live session and the user directory. Sessions move
//! through three states:
//!
//! ```text
//! Waiting ──(enough players)──> Running
//!    │                             │
//!    └────────(terminate)──────────┴──> Ended
//! ```
//!
//! A waiting session lives in the waiting set, a running one in the running
//! set, an ended one in neither. Party names are unique per game type across
//! both sets.
//!
//! The lobby is not internally synchronized. The server keeps it behind one
//! mutex so every check-then-act sequence below (placing a player, starting
//! a session, terminating one, scanning for missed keep-alives) runs as a
//! single critical section.

use crate::config::ServerConfig;
use crate::error::{GameError, StoreError};
use crate::game::{Game, GameState, GameSummary};
use crate::observer::AdminObserver;
use crate::registry::ModuleRegistry;
use crate::users::UserDirectory;
use log::{debug, info, warn};
use shared::{GameMode, GamePayload, JoinType, Message, Player};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// Base name for synthetic opponents in single-player sessions.
pub const AI_NAME: &str = "Computer";

/// Reason broadcast when a session is ended by a missed keep-alive.
pub const NO_ANSWER: &str = "did not answer";

/// A request to be placed into a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub game_type: String,
    pub mode: GameMode,
    pub join_type: JoinType,
    pub party_name: Option<String>,
    pub private: bool,
}

impl JoinRequest {
    /// Extracts a join request from a `Join` message.
    pub fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Join {
                game_type,
                mode,
                join_type,
                party_name,
                private,
            } => Some(Self {
                game_type: game_type.clone(),
                mode: *mode,
                join_type: *join_type,
                party_name: party_name.clone(),
                private: *private,
            }),
            _ => None,
        }
    }

    fn party(&self) -> Option<&str> {
        self.party_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// Result of a join request, as reported to the joining player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub success: bool,
    pub created: bool,
    pub game_id: Option<u64>,
    pub party_name: Option<String>,
    pub reason: Option<String>,
}

impl JoinOutcome {
    fn joined(game: &Game, created: bool) -> Self {
        Self {
            success: true,
            created,
            game_id: Some(game.id),
            party_name: Some(game.party_name.clone()),
            reason: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            created: false,
            game_id: None,
            party_name: None,
            reason: Some(reason.into()),
        }
    }

    pub fn to_message(&self) -> Message {
        Message::JoinResponse {
            success: self.success,
            created: self.created,
            game_id: self.game_id,
            party_name: self.party_name.clone(),
            reason: self.reason.clone(),
        }
    }
}

pub struct Lobby {
    waiting: Vec<Game>,
    running: Vec<Game>,
    users: UserDirectory,
    registry: Arc<ModuleRegistry>,
    observer: Arc<dyn AdminObserver>,
    next_game_id: u64,
    /// Players probed by the keep-alive monitor who have not answered yet
    keep_alive_due: HashSet<String>,
}

impl Lobby {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        users: UserDirectory,
        observer: Arc<dyn AdminObserver>,
    ) -> Self {
        Self {
            waiting: Vec::new(),
            running: Vec::new(),
            users,
            registry,
            observer,
            next_game_id: 1,
            keep_alive_due: HashSet::new(),
        }
    }

    /// Builds the lobby a configured server starts with, loading durable
    /// users from the configured store.
    pub fn from_config(
        config: &ServerConfig,
        observer: Arc<dyn AdminObserver>,
    ) -> Result<Self, StoreError> {
        let mut users = UserDirectory::new(config.anonymous_login, config.multi_login)
            .with_observer(Arc::clone(&observer));
        users.load(&config.user_store)?;
        let registry = ModuleRegistry::new(config.module_dir.clone(), config.build_command.clone());
        Ok(Self::new(Arc::new(registry), users, observer))
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut UserDirectory {
        &mut self.users
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    pub fn waiting(&self) -> &[Game] {
        &self.waiting
    }

    pub fn running(&self) -> &[Game] {
        &self.running
    }

    pub fn game(&self, game_id: u64) -> Option<&Game> {
        self.live_games().find(|g| g.id == game_id)
    }

    pub fn summaries(&self) -> Vec<GameSummary> {
        self.live_games().map(Game::summary).collect()
    }

    fn live_games(&self) -> impl Iterator<Item = &Game> {
        self.waiting.iter().chain(self.running.iter())
    }

    fn party_in(games: &[Game], game_type: &str, party: &str) -> Option<usize> {
        games
            .iter()
            .position(|g| g.game_type.eq_ignore_ascii_case(game_type) && g.party_name == party)
    }

    /// A party name for `game_type` that no live session uses: `base` if it
    /// is free, else `base` followed by the smallest free counter.
    pub fn suggest_party_name(&self, game_type: &str, base: &str) -> String {
        let taken: HashSet<&str> = self
            .live_games()
            .filter(|g| g.game_type.eq_ignore_ascii_case(game_type))
            .map(|g| g.party_name.as_str())
            .collect();

        if !taken.contains(base) {
            return base.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}{}", base, n);
            if !taken.contains(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Places a player into a session according to `request`.
    ///
    /// The player always receives a `JoinResponse`. If the placement filled
    /// the session, it starts right after.
    pub fn join(&mut self, request: &JoinRequest, player: Player) -> JoinOutcome {
        let replier = player.clone();
        let outcome = self.place(request, player);
        replier.send(outcome.to_message());

        match (&outcome.game_id, &outcome.reason) {
            (Some(game_id), _) => {
                info!("{} joined game {}", replier.name, game_id);
                self.evaluate_start(*game_id, &replier);
            }
            (None, Some(reason)) => info!("{} could not join: {}", replier.name, reason),
            (None, None) => {}
        }
        outcome
    }

    fn place(&mut self, request: &JoinRequest, player: Player) -> JoinOutcome {
        if let Some(game) = self.live_games().find(|g| g.contains(&player.name)) {
            return JoinOutcome::failed(format!(
                "You are already taking part in game {}",
                game.id
            ));
        }

        let module = match self.registry.resolve(&request.game_type) {
            Ok(module) => module,
            Err(e) => {
                warn!("Cannot load game type {}: {}", request.game_type, e);
                player.send(Message::exception(
                    format!("Could not load game type {}", request.game_type),
                    e.to_string(),
                ));
                return JoinOutcome::failed(e.to_string());
            }
        };
        let game_type = module.name().to_string();

        if request.mode == GameMode::SinglePlayer || request.join_type == JoinType::Auto {
            return self.place_auto(request, &game_type, player);
        }

        let Some(party) = request.party() else {
            return JoinOutcome::failed("A party name is required");
        };

        match request.join_type {
            JoinType::Create => {
                if Self::party_in(&self.waiting, &game_type, party).is_some() {
                    return JoinOutcome::failed(format!("Party '{}' already exists", party));
                }
                if Self::party_in(&self.running, &game_type, party).is_some() {
                    return JoinOutcome::failed(format!(
                        "Party '{}' already exists and has already started",
                        party
                    ));
                }
                self.create_game(request, &game_type, party, request.private, player)
            }
            _ => {
                let Some(index) = Self::party_in(&self.waiting, &game_type, party) else {
                    if Self::party_in(&self.running, &game_type, party).is_some() {
                        return JoinOutcome::failed(format!(
                            "Party '{}' has already started",
                            party
                        ));
                    }
                    return JoinOutcome::failed(format!("Party '{}' does not exist", party));
                };
                let game = &mut self.waiting[index];
                if !game.add_player(player) {
                    return JoinOutcome::failed(format!("Party '{}' is full", party));
                }
                JoinOutcome::joined(game, false)
            }
        }
    }

    fn place_auto(&mut self, request: &JoinRequest, game_type: &str, player: Player) -> JoinOutcome {
        if request.mode == GameMode::Multiplayer {
            let open = self.waiting.iter().position(|g| {
                g.game_type == game_type
                    && g.mode == GameMode::Multiplayer
                    && !g.private
                    && !g.is_full()
            });
            if let Some(index) = open {
                let game = &mut self.waiting[index];
                game.add_player(player);
                return JoinOutcome::joined(game, false);
            }
        }

        let base = request.party().unwrap_or(game_type).to_string();
        let party = self.suggest_party_name(game_type, &base);
        self.create_game(request, game_type, &party, false, player)
    }

    fn create_game(
        &mut self,
        request: &JoinRequest,
        game_type: &str,
        party: &str,
        private: bool,
        player: Player,
    ) -> JoinOutcome {
        let module = match self.registry.resolve(game_type) {
            Ok(module) => module,
            Err(e) => return JoinOutcome::failed(e.to_string()),
        };
        let logic = match module.create(request.mode) {
            Ok(logic) => logic,
            Err(e) => {
                warn!("Game type {} refused to create a session: {}", game_type, e);
                player.send(Message::exception(
                    format!("Could not create a {} session", game_type),
                    e.to_string(),
                ));
                return JoinOutcome::failed(e.to_string());
            }
        };

        // single-player and test sessions are never open to auto-join
        let private = private || request.mode != GameMode::Multiplayer;
        let min_players = match request.mode {
            GameMode::Test => 1,
            _ => module.min_players(),
        };
        let id = self.next_game_id;
        self.next_game_id += 1;

        let mut game = Game::new(
            id,
            game_type,
            request.mode,
            min_players,
            module.max_players(),
            party,
            private,
            logic,
        );
        game.add_player(player);

        if request.mode == GameMode::SinglePlayer {
            while !game.has_enough_players() {
                let name = self.users.register_ai(AI_NAME);
                game.add_player(Player::ai(&name));
            }
        }

        self.observer.game_created(&game.summary());
        let outcome = JoinOutcome::joined(&game, true);
        self.waiting.push(game);
        outcome
    }

    /// Moves a waiting session to the running set once it has enough
    /// players, then runs its start hook.
    ///
    /// A failing start hook is reported to `trigger` and the session stays
    /// running.
    fn evaluate_start(&mut self, game_id: u64, trigger: &Player) {
        let Some(index) = self.waiting.iter().position(|g| g.id == game_id) else {
            return;
        };
        if !self.waiting[index].has_enough_players() {
            debug!(
                "Game {} waiting for players ({}/{})",
                game_id,
                self.waiting[index].players.len(),
                self.waiting[index].min_players
            );
            return;
        }

        let mut game = self.waiting.remove(index);
        game.state = GameState::Running;
        game.broadcast(Message::GameStarted {
            game_id,
            game_type: game.game_type.clone(),
            party_name: game.party_name.clone(),
            players: game.players.iter().map(Player::without_connection).collect(),
        });
        self.observer
            .log_line(&format!("Game {} started with {:?}", game_id, game.summary().players));

        let result = game.initialize();
        self.running.push(game);

        match result {
            Ok(outcome) => {
                if let Some(reason) = outcome.finished {
                    self.terminate(game_id, &reason, None);
                }
            }
            Err(e) => {
                warn!("Game {} failed to initialize: {}", game_id, e);
                trigger.send(Message::exception(
                    format!("Game {} failed to initialize", game_id),
                    e.to_string(),
                ));
            }
        }
    }

    /// Feeds a game action to its running session.
    ///
    /// Returns the diagnostic to hand back to the sender when the action
    /// could not be applied. A fault in the game logic ends the session with
    /// the sender as culprit.
    pub fn route_action(
        &mut self,
        game_id: u64,
        sender: &str,
        payload: &GamePayload,
    ) -> Result<(), Message> {
        let Some(game) = self.running.iter_mut().find(|g| g.id == game_id) else {
            return Err(Message::exception(
                "Action rejected",
                format!("Game {} is not running", game_id),
            ));
        };

        match game.handle_action(sender, payload) {
            Ok(outcome) => {
                if let Some(reason) = outcome.finished {
                    self.terminate(game_id, &reason, None);
                }
                Ok(())
            }
            Err(GameError::IllegalMove(reason)) => {
                Err(Message::exception("Action rejected", reason))
            }
            Err(GameError::Fault(reason)) => {
                warn!("Game {} failed on action from {}: {}", game_id, sender, reason);
                self.terminate(
                    game_id,
                    &format!("{} caused a failure: {}", sender, reason),
                    Some(sender),
                );
                Err(Message::exception("Game failed", reason))
            }
        }
    }

    fn take_game(&mut self, game_id: u64) -> Option<Game> {
        if let Some(index) = self.waiting.iter().position(|g| g.id == game_id) {
            return Some(self.waiting.remove(index));
        }
        if let Some(index) = self.running.iter().position(|g| g.id == game_id) {
            return Some(self.running.remove(index));
        }
        None
    }

    /// Ends a session.
    ///
    /// The culprit, if any, leaves the roster before the remaining players
    /// are told why the session ended. Every participant is then logged off
    /// and temporary identities no longer in any session are dropped.
    pub fn terminate(&mut self, game_id: u64, reason: &str, culprit: Option<&str>) -> bool {
        let Some(mut game) = self.take_game(game_id) else {
            return false;
        };
        game.state = GameState::Ended;

        let mut leaving = Vec::new();
        if let Some(name) = culprit {
            if let Some(player) = game.remove_player(name) {
                leaving.push(player.name);
            }
        }

        game.broadcast(Message::GameTerminated {
            game_id,
            reason: reason.to_string(),
        });

        leaving.extend(game.players.iter().map(|p| p.name.clone()));
        for name in &leaving {
            self.users.log_off(name);
            self.keep_alive_due.remove(name);
        }

        self.observer.game_removed(game_id, reason);
        self.cleanup_stale_users();
        true
    }

    /// Ends every session the named player takes part in, with that player
    /// as culprit. Used when a connection goes away.
    pub fn player_disconnected(&mut self, name: &str) {
        let games: Vec<u64> = self
            .live_games()
            .filter(|g| g.contains(name))
            .map(|g| g.id)
            .collect();
        for game_id in games {
            self.terminate(game_id, &format!("{} left the game", name), Some(name));
        }
        self.users.log_off(name);
        self.keep_alive_due.remove(name);
        self.cleanup_stale_users();
    }

    /// Drops temporary identities absent from every live roster.
    pub fn cleanup_stale_users(&mut self) -> Vec<String> {
        let active: HashSet<String> = self
            .live_games()
            .flat_map(|g| g.players.iter().map(|p| p.name.clone()))
            .collect();
        self.users.cleanup_stale(&active)
    }

    /// Probes every human in a running session and marks them as due.
    /// Returns the number of probes sent.
    pub fn send_keep_alive_probes(&mut self) -> usize {
        let mut probed = 0;
        for game in &self.running {
            for player in game.humans() {
                player.send(Message::KeepAlive);
                self.keep_alive_due.insert(player.name.clone());
                probed += 1;
            }
        }
        probed
    }

    /// Records a keep-alive answer, whichever cycle the probe was sent in.
    pub fn keep_alive_answered(&mut self, name: &str) {
        self.keep_alive_due.remove(name);
    }

    pub fn is_keep_alive_due(&self, name: &str) -> bool {
        self.keep_alive_due.contains(name)
    }

    /// Terminates every running session that still holds a player who has
    /// not answered, then clears the due set. Returns the ended game ids.
    pub fn expire_keep_alives(&mut self) -> Vec<u64> {
        let expired: Vec<(u64, String)> = self
            .running
            .iter()
            .filter_map(|g| {
                g.humans()
                    .map(|p| p.name.clone())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .find(|name| self.keep_alive_due.contains(name))
                    .map(|name| (g.id, name))
            })
            .collect();
        self.keep_alive_due.clear();

        for (game_id, name) in &expired {
            warn!("Game {}: {} did not answer the keep-alive probe", game_id, name);
            self.terminate(*game_id, &format!("{} {}", name, NO_ANSWER), Some(name));
        }
        expired.into_iter().map(|(id, _)| id).collect()
    }
}
