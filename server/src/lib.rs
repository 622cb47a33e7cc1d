//! # Game Room Server Library
//!
//! This library provides the session server for turn-based multiplayer games.
//! It authenticates users, matches them into game sessions, relays game moves
//! between the participants of a session and ends sessions whose players went
//! silent.
//!
//! ## Core Responsibilities
//!
//! ### Identity
//! Every connection identifies itself before it may join a game. Users come
//! from a durable store, or are minted on the fly when anonymous login is
//! enabled. A user who is already logged in may log in again under a
//! numbered clone (a doppelganger) when multi-login is enabled.
//!
//! ### Matchmaking
//! A player either creates a named party, joins a particular party, or asks
//! to be placed automatically. Single-player requests always get a private
//! session with AI opponents filling the remaining seats. A session starts as
//! soon as it holds enough players.
//!
//! ### Session Lifecycle
//! Sessions move from waiting to running to ended. Ending a session tells the
//! remaining players why, logs every participant off and drops temporary
//! identities that no longer play anywhere.
//!
//! ### Liveness
//! A keep-alive monitor probes the players of running sessions on a fixed
//! interval. A session holding a player who did not answer by the next scan
//! is ended.
//!
//! ## Architecture Design
//!
//! ### One Coarse Lock
//! The waiting sessions, running sessions and the user directory live in one
//! [`lobby::Lobby`] behind a single `tokio::sync::Mutex`. Connection tasks,
//! the keep-alive monitor and the admin console each take the lock for a
//! whole check-then-act sequence.
//!
//! ### Line Protocol Over TCP
//! Messages are JSON lines (see the `shared` crate). Each connection has a
//! reader task and a writer task; everything sent to a player is queued on
//! its connection and written by that one writer.
//!
//! ### Pluggable Game Types
//! Game rules live behind the [`registry::GameModule`] and
//! [`registry::GameLogic`] traits. The server core never looks inside game
//! payloads.
//!
//! ## Module Organization
//!
//! ### Lobby Module (`lobby`)
//! Matchmaking, session start and termination, keep-alive bookkeeping.
//!
//! ### Game Module (`game`)
//! One session: roster, turn pointer and the game logic driving it.
//!
//! ### Users Module (`users`)
//! Logins, doppelgangers, anonymous and AI identities, the durable store.
//!
//! ### Registry Module (`registry`)
//! Game module catalog, artifact checks, caching and rebuilds.
//!
//! ### Network Module (`network`)
//! TCP listener and per-connection message dispatch.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::lobby::Lobby;
//! use server::network::Server;
//! use server::observer::LogObserver;
//! use std::sync::Arc;
//! use tokio::sync::Mutex;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let lobby = Arc::new(Mutex::new(Lobby::from_config(&config, Arc::new(LogObserver))?));
//!
//!     // Probe players of running games every ten seconds
//!     tokio::spawn(server::keepalive::run(Arc::clone(&lobby), config.keep_alive_interval()));
//!
//!     let server = Server::bind(&config.address(), lobby).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod error;
pub mod game;
pub mod games;
pub mod keepalive;
pub mod lobby;
pub mod network;
pub mod observer;
pub mod registry;
pub mod users;
