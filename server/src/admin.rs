//! Administrative console on stdin.
//!
//! One command per line: `games`, `users`, `kill <id>`, `rebuild`,
//! `modules`, `save`, `quit`.

use crate::lobby::Lobby;
use crate::users;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

pub const KILLED_BY_ADMIN: &str = "Terminated by the administrator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Games,
    Users,
    Kill(u64),
    Rebuild,
    Modules,
    Save,
    Quit,
    Help,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let mut words = line.split_whitespace();
        let command = match words.next().map(str::to_lowercase).as_deref() {
            Some("games") => Command::Games,
            Some("users") => Command::Users,
            Some("kill") => {
                let id = words
                    .next()
                    .ok_or_else(|| "usage: kill <game id>".to_string())?;
                let id = id
                    .parse()
                    .map_err(|_| format!("'{}' is not a game id", id))?;
                Command::Kill(id)
            }
            Some("rebuild") => Command::Rebuild,
            Some("modules") => Command::Modules,
            Some("save") => Command::Save,
            Some("quit") | Some("exit") => Command::Quit,
            Some("help") | None => Command::Help,
            Some(other) => return Err(format!("unknown command '{}', try 'help'", other)),
        };
        Ok(command)
    }
}

pub struct Console {
    lobby: Arc<Mutex<Lobby>>,
    user_store: PathBuf,
}

impl Console {
    pub fn new(lobby: Arc<Mutex<Lobby>>, user_store: PathBuf) -> Self {
        Self { lobby, user_store }
    }

    /// Runs one command and returns the lines to show.
    pub async fn execute(&self, command: &Command) -> Vec<String> {
        match command {
            Command::Games => {
                let lobby = self.lobby.lock().await;
                let games = lobby.summaries();
                if games.is_empty() {
                    return vec!["no games".to_string()];
                }
                games
                    .iter()
                    .map(|g| {
                        format!(
                            "{:>4} {:<12} {:<16} {:<8} {:?}{} [{}]",
                            g.id,
                            g.game_type,
                            g.party_name,
                            g.state,
                            g.mode,
                            if g.private { " private" } else { "" },
                            g.players.join(", ")
                        )
                    })
                    .collect()
            }
            Command::Users => {
                let lobby = self.lobby.lock().await;
                lobby
                    .users()
                    .users()
                    .iter()
                    .map(|u| {
                        let mut flags = Vec::new();
                        if u.logged_in {
                            flags.push("online");
                        }
                        if u.anonymous {
                            flags.push("anonymous");
                        }
                        if u.doppelganger {
                            flags.push("doppelganger");
                        }
                        if u.ai {
                            flags.push("ai");
                        }
                        format!("{:>4} {:<16} {}", u.id, u.username, flags.join(" "))
                    })
                    .collect()
            }
            Command::Kill(id) => {
                if self.lobby.lock().await.terminate(*id, KILLED_BY_ADMIN, None) {
                    vec![format!("game {} terminated", id)]
                } else {
                    vec![format!("no game {}", id)]
                }
            }
            Command::Rebuild => {
                let registry = Arc::clone(self.lobby.lock().await.registry());
                match tokio::task::spawn_blocking(move || registry.rebuild_all()).await {
                    Ok(Ok(())) => vec!["modules rebuilt".to_string()],
                    Ok(Err(e)) => vec![format!("rebuild failed: {}", e)],
                    Err(e) => vec![format!("rebuild task failed: {}", e)],
                }
            }
            Command::Modules => {
                let registry = Arc::clone(self.lobby.lock().await.registry());
                let listing = tokio::task::spawn_blocking(move || {
                    registry.list_installed().map(|names| (names, registry.cached()))
                })
                .await;
                match listing {
                    Ok(Ok((names, cached))) => names
                        .into_iter()
                        .map(|name| {
                            let loaded = cached.contains(&name.to_lowercase());
                            format!("{}{}", name, if loaded { " (loaded)" } else { "" })
                        })
                        .collect(),
                    Ok(Err(e)) => vec![format!("cannot list modules: {}", e)],
                    Err(e) => vec![format!("listing task failed: {}", e)],
                }
            }
            Command::Save => {
                let stored = self.lobby.lock().await.users().to_stored();
                let path = self.user_store.clone();
                match tokio::task::spawn_blocking(move || users::write_store(&path, &stored)).await {
                    Ok(Ok(count)) => vec![format!("saved {} users", count)],
                    Ok(Err(e)) => vec![format!("save failed: {}", e)],
                    Err(e) => vec![format!("save task failed: {}", e)],
                }
            }
            Command::Quit => vec!["shutting down".to_string()],
            Command::Help => vec!["commands: games, users, kill <id>, rebuild, modules, save, quit"
                .to_string()],
        }
    }

    /// Reads commands until `quit`. Never returns if stdin closes first, so
    /// a detached server keeps running.
    pub async fn run(self) {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Console input failed: {}", e);
                    break;
                }
            };

            match Command::parse(&line) {
                Ok(command) => {
                    for output in self.execute(&command).await {
                        println!("{}", output);
                    }
                    if command == Command::Quit {
                        return;
                    }
                }
                Err(e) => println!("{}", e),
            }
        }

        info!("Console input closed");
        std::future::pending::<()>().await;
    }
}
