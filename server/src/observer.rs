//! Hooks for an administrative front end.
//!
//! The server core reports sessions and users coming and going through
//! [`AdminObserver`]. The headless server uses [`LogObserver`], which writes
//! each notification to the log.

use crate::game::GameSummary;
use log::info;

pub trait AdminObserver: Send + Sync {
    fn game_created(&self, _game: &GameSummary) {}
    fn game_removed(&self, _game_id: u64, _reason: &str) {}
    fn user_added(&self, _username: &str) {}
    fn user_removed(&self, _username: &str) {}
    fn log_line(&self, _line: &str) {}
}

pub struct LogObserver;

impl AdminObserver for LogObserver {
    fn game_created(&self, game: &GameSummary) {
        info!(
            "Game {} created: {} party '{}'{}",
            game.id,
            game.game_type,
            game.party_name,
            if game.private { " (private)" } else { "" }
        );
    }

    fn game_removed(&self, game_id: u64, reason: &str) {
        info!("Game {} removed: {}", game_id, reason);
    }

    fn user_added(&self, username: &str) {
        info!("User {} added", username);
    }

    fn user_removed(&self, username: &str) {
        info!("User {} removed", username);
    }

    fn log_line(&self, line: &str) {
        info!("{}", line);
    }
}

/// Observer that remembers every notification, for assertions in tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingObserver {
    pub events: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
impl AdminObserver for RecordingObserver {
    fn game_created(&self, game: &GameSummary) {
        self.push(format!("game_created {}", game.id));
    }

    fn game_removed(&self, game_id: u64, reason: &str) {
        self.push(format!("game_removed {} {}", game_id, reason));
    }

    fn user_added(&self, username: &str) {
        self.push(format!("user_added {}", username));
    }

    fn user_removed(&self, username: &str) {
        self.push(format!("user_removed {}", username));
    }
}
