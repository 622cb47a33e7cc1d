//! Keep-alive monitor
//!
//! Every cycle probes each human player of each running session, waits one
//! interval and then ends every running session that still holds a player
//! who did not answer. Answers arrive through
//! [`Lobby::keep_alive_answered`] on the connection tasks, so a silent
//! player is caught within at most two intervals.

use crate::lobby::Lobby;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Runs one probe-wait-expire cycle and returns the ended game ids.
pub async fn run_cycle(lobby: &Arc<Mutex<Lobby>>, interval: Duration) -> Vec<u64> {
    let probed = lobby.lock().await.send_keep_alive_probes();
    if probed > 0 {
        debug!("Sent {} keep-alive probes", probed);
    }

    tokio::time::sleep(interval).await;

    lobby.lock().await.expire_keep_alives()
}

/// Repeats [`run_cycle`] until the task is dropped.
pub async fn run(lobby: Arc<Mutex<Lobby>>, interval: Duration) {
    info!("Keep-alive monitor running every {:?}", interval);
    loop {
        let expired = run_cycle(&lobby, interval).await;
        if !expired.is_empty() {
            info!("Keep-alive ended games {:?}", expired);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::{JoinRequest, NO_ANSWER};
    use crate::observer::RecordingObserver;
    use crate::registry::ModuleRegistry;
    use crate::users::UserDirectory;
    use shared::{decode, Connection, GameMode, JoinType, Message, Player};
    use tokio::sync::mpsc::UnboundedReceiver;

    const INTERVAL: Duration = Duration::from_secs(10);

    struct Table {
        lobby: Arc<Mutex<Lobby>>,
        game_id: u64,
        alice: UnboundedReceiver<String>,
        bob: UnboundedReceiver<String>,
    }

    /// Two anonymous players in one running TicTacToe session.
    fn table() -> Table {
        let mut lobby = Lobby::new(
            Arc::new(ModuleRegistry::new(None, None)),
            UserDirectory::new(true, false),
            Arc::new(RecordingObserver::default()),
        );
        let request = JoinRequest {
            game_type: "TicTacToe".to_string(),
            mode: GameMode::Multiplayer,
            join_type: JoinType::Auto,
            party_name: None,
            private: false,
        };

        let mut receivers = Vec::new();
        let mut game_id = 0;
        for name in ["alice", "bob"] {
            lobby.users_mut().identify(name, "", name, false);
            let (connection, rx) = Connection::channel();
            game_id = lobby
                .join(&request, Player::new(name, name, Some(connection)))
                .game_id
                .unwrap();
            receivers.push(rx);
        }
        assert_eq!(lobby.running().len(), 1);

        let bob = receivers.pop().unwrap();
        let alice = receivers.pop().unwrap();
        Table {
            lobby: Arc::new(Mutex::new(lobby)),
            game_id,
            alice,
            bob,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(line) = rx.try_recv() {
            messages.push(decode(&line).message);
        }
        messages
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_players_end_the_game() {
        let mut table = table();
        drain(&mut table.alice);

        let expired = run_cycle(&table.lobby, INTERVAL).await;
        assert_eq!(expired, vec![table.game_id]);
        assert!(table.lobby.lock().await.running().is_empty());

        let messages = drain(&mut table.alice);
        assert_eq!(messages.first(), Some(&Message::KeepAlive));
        // alice is the culprit, bob hears about it
        assert!(!messages.iter().any(|m| matches!(m, Message::GameTerminated { .. })));
        assert!(drain(&mut table.bob).iter().any(|m| matches!(
            m,
            Message::GameTerminated { reason, .. } if reason.contains(NO_ANSWER)
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_answers_keep_the_game_alive() {
        let table = table();

        let lobby = Arc::clone(&table.lobby);
        let cycle = tokio::spawn(async move { run_cycle(&lobby, INTERVAL).await });

        tokio::time::advance(Duration::from_secs(1)).await;
        {
            let mut lobby = table.lobby.lock().await;
            assert!(lobby.is_keep_alive_due("alice"));
            lobby.keep_alive_answered("alice");
            lobby.keep_alive_answered("bob");
        }

        let expired = tokio_test::assert_ok!(cycle.await);
        assert!(expired.is_empty());
        assert_eq!(table.lobby.lock().await.running().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_detects_within_two_intervals() {
        let table = table();
        let monitor = tokio::spawn(run(Arc::clone(&table.lobby), INTERVAL));

        tokio::time::sleep(INTERVAL * 2 + Duration::from_millis(1)).await;
        assert!(table.lobby.lock().await.running().is_empty());
        monitor.abort();
    }
}
