use crate::error::GameError;
use crate::registry::{GameEvent, GameLogic};
use log::{debug, warn};
use shared::{GameMode, GamePayload, Message, Player};

/// Where a session stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Waiting,
    Running,
    Ended,
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GameState::Waiting => "waiting",
            GameState::Running => "running",
            GameState::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Snapshot of a session for administrative listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSummary {
    pub id: u64,
    pub game_type: String,
    pub party_name: String,
    pub mode: GameMode,
    pub private: bool,
    pub state: GameState,
    pub players: Vec<String>,
}

/// What came out of feeding an action to a session.
#[derive(Debug, Default)]
pub struct ActionOutcome {
    /// Set when the game logic declared the game over
    pub finished: Option<String>,
}

/// One session of a game type.
pub struct Game {
    pub id: u64,
    pub game_type: String,
    pub mode: GameMode,
    pub min_players: usize,
    pub max_players: usize,
    pub party_name: String,
    pub private: bool,
    pub players: Vec<Player>,
    pub current_player: Option<usize>,
    pub state: GameState,
    next_player_id: u32,
    logic: Box<dyn GameLogic>,
}

impl Game {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        game_type: &str,
        mode: GameMode,
        min_players: usize,
        max_players: usize,
        party_name: &str,
        private: bool,
        logic: Box<dyn GameLogic>,
    ) -> Self {
        Self {
            id,
            game_type: game_type.to_string(),
            mode,
            min_players,
            max_players,
            party_name: party_name.to_string(),
            private,
            players: Vec::new(),
            current_player: None,
            state: GameState::Waiting,
            next_player_id: 1,
            logic,
        }
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.max_players
    }

    pub fn has_enough_players(&self) -> bool {
        self.players.len() >= self.min_players
    }

    /// Seats a player, assigning the next session-scoped id.
    pub fn add_player(&mut self, mut player: Player) -> bool {
        if self.is_full() {
            return false;
        }
        player.id = self.next_player_id;
        self.next_player_id += 1;
        debug!("Game {}: seated {} as player {}", self.id, player.name, player.id);
        self.players.push(player);
        true
    }

    /// Removes a player by name. The current-player pointer follows the
    /// remaining roster.
    pub fn remove_player(&mut self, name: &str) -> Option<Player> {
        let index = self.position(name)?;
        let player = self.players.remove(index);
        self.current_player = match self.current_player {
            Some(current) if current == index => None,
            Some(current) if current > index => Some(current - 1),
            other => other,
        };
        Some(player)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn current(&self) -> Option<&Player> {
        self.current_player.and_then(|index| self.players.get(index))
    }

    /// Human participants, i.e. everyone who can receive messages.
    pub fn humans(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| !p.ai)
    }

    pub fn broadcast(&self, message: Message) {
        for player in self.humans() {
            if !player.send(message.clone()) {
                debug!("Game {}: {} is unreachable", self.id, player.name);
            }
        }
    }

    pub fn summary(&self) -> GameSummary {
        GameSummary {
            id: self.id,
            game_type: self.game_type.clone(),
            party_name: self.party_name.clone(),
            mode: self.mode,
            private: self.private,
            state: self.state,
            players: self.players.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// Runs the type-specific start hook.
    pub fn initialize(&mut self) -> Result<ActionOutcome, GameError> {
        let events = self.logic.initialize(&self.players)?;
        Ok(self.apply(events))
    }

    /// Feeds a payload from the named participant to the game logic.
    pub fn handle_action(
        &mut self,
        sender: &str,
        payload: &GamePayload,
    ) -> Result<ActionOutcome, GameError> {
        let index = self
            .position(sender)
            .ok_or_else(|| GameError::IllegalMove(format!("{} is not in this game", sender)))?;
        let events = self.logic.handle(index, payload)?;
        Ok(self.apply(events))
    }

    fn apply(&mut self, events: Vec<GameEvent>) -> ActionOutcome {
        let mut outcome = ActionOutcome::default();
        for event in events {
            match event {
                GameEvent::Send { to, payload } => match self.players.get(to) {
                    Some(player) => {
                        player.send(Message::GameUpdate {
                            game_id: self.id,
                            payload,
                        });
                    }
                    None => warn!("Game {}: no seat {} to send to", self.id, to),
                },
                GameEvent::Broadcast(payload) => self.broadcast(Message::GameUpdate {
                    game_id: self.id,
                    payload,
                }),
                GameEvent::Turn(seat) => self.current_player = Some(seat),
                GameEvent::Finished(reason) => outcome.finished = Some(reason),
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::TicTacToe;
    use shared::Connection;

    fn game(max_players: usize) -> Game {
        Game::new(
            1,
            "TicTacToe",
            GameMode::Multiplayer,
            2,
            max_players,
            "party",
            false,
            Box::new(TicTacToe::new(GameMode::Multiplayer)),
        )
    }

    #[test]
    fn test_player_ids_are_session_scoped() {
        let mut game = game(3);
        assert!(game.add_player(Player::new("a", "Alice", None)));
        assert!(game.add_player(Player::new("b", "Bob", None)));

        assert_eq!(game.players[0].id, 1);
        assert_eq!(game.players[1].id, 2);
        assert!(game.has_enough_players());
    }

    #[test]
    fn test_add_player_respects_max() {
        let mut game = game(2);
        assert!(game.add_player(Player::new("a", "Alice", None)));
        assert!(game.add_player(Player::new("b", "Bob", None)));
        assert!(!game.add_player(Player::new("c", "Carol", None)));
        assert_eq!(game.players.len(), 2);
    }

    #[test]
    fn test_remove_player_adjusts_current() {
        let mut game = game(3);
        game.add_player(Player::new("a", "Alice", None));
        game.add_player(Player::new("b", "Bob", None));
        game.add_player(Player::new("c", "Carol", None));
        game.current_player = Some(2);

        assert!(game.remove_player("Alice").is_some());
        assert_eq!(game.current().map(|p| p.name.as_str()), Some("Carol"));

        assert!(game.remove_player("Carol").is_some());
        assert_eq!(game.current_player, None);
        assert!(game.remove_player("Nobody").is_none());
    }

    #[test]
    fn test_initialize_broadcasts_and_sets_turn() {
        let (alice_conn, mut alice_rx) = Connection::channel();
        let mut game = game(2);
        game.add_player(Player::new("a", "Alice", Some(alice_conn)));
        game.add_player(Player::new("b", "Bob", None));

        let outcome = game.initialize().unwrap();
        assert!(outcome.finished.is_none());
        assert_eq!(game.current().map(|p| p.name.as_str()), Some("Alice"));

        let envelope = shared::decode(&alice_rx.try_recv().unwrap());
        assert!(matches!(envelope.message, Message::GameUpdate { game_id: 1, .. }));
    }

    #[test]
    fn test_action_from_outsider_rejected() {
        let mut game = game(2);
        game.add_player(Player::new("a", "Alice", None));
        game.add_player(Player::new("b", "Bob", None));
        game.initialize().unwrap();

        let payload = GamePayload {
            kind: "move".to_string(),
            data: Vec::new(),
        };
        assert!(matches!(
            game.handle_action("Mallory", &payload),
            Err(GameError::IllegalMove(_))
        ));
    }
}
