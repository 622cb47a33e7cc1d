//! Tic-tac-toe for two seats.
//!
//! Clients send a `"move"` payload holding a [`Move`]; every change is
//! broadcast as a `"board"` payload holding a [`Board`]. In single-player
//! mode the second seat is an AI that takes the first free cell. In test
//! mode one participant plays both marks.

use crate::error::GameError;
use crate::registry::{GameEvent, GameLogic, GameModule};
use serde::{Deserialize, Serialize};
use shared::{GameMode, GamePayload, Player};
use std::sync::Arc;

pub const NAME: &str = "TicTacToe";

pub const MOVE: &str = "move";
pub const BOARD: &str = "board";

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    /// Cell index, row-major from 0 to 8
    pub cell: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// Seat index owning each cell
    pub cells: [Option<u8>; 9],
    pub next: Option<u8>,
    pub winner: Option<u8>,
}

pub struct TicTacToeModule;

pub fn module() -> Result<Arc<dyn GameModule>, String> {
    Ok(Arc::new(TicTacToeModule))
}

impl GameModule for TicTacToeModule {
    fn name(&self) -> &str {
        NAME
    }

    fn min_players(&self) -> usize {
        2
    }

    fn max_players(&self) -> usize {
        2
    }

    fn create(&self, mode: GameMode) -> Result<Box<dyn GameLogic>, GameError> {
        Ok(Box::new(TicTacToe::new(mode)))
    }
}

pub struct TicTacToe {
    mode: GameMode,
    board: Board,
    names: Vec<String>,
    ai_seats: Vec<bool>,
}

impl TicTacToe {
    pub fn new(mode: GameMode) -> Self {
        Self {
            mode,
            board: Board {
                cells: [None; 9],
                next: None,
                winner: None,
            },
            names: Vec::new(),
            ai_seats: Vec::new(),
        }
    }

    fn seats(&self) -> usize {
        match self.mode {
            GameMode::Test => 1,
            _ => 2,
        }
    }

    fn place(&mut self, cell: usize, mark: u8) -> Result<(), GameError> {
        match self.board.cells.get(cell) {
            None => Err(GameError::IllegalMove(format!("cell {} is off the board", cell))),
            Some(Some(_)) => Err(GameError::IllegalMove(format!("cell {} is taken", cell))),
            Some(None) => {
                self.board.cells[cell] = Some(mark);
                Ok(())
            }
        }
    }

    fn winner(&self) -> Option<u8> {
        LINES.iter().find_map(|line| {
            let first = self.board.cells[line[0]]?;
            line.iter()
                .all(|&i| self.board.cells[i] == Some(first))
                .then_some(first)
        })
    }

    fn is_full(&self) -> bool {
        self.board.cells.iter().all(Option::is_some)
    }

    /// Settles the board after a mark was placed. Returns the finishing
    /// reason if the game is over.
    fn settle(&mut self, mark: u8) -> Option<String> {
        if let Some(winner) = self.winner() {
            self.board.winner = Some(winner);
            self.board.next = None;
            let name = self.seat_name(winner);
            return Some(format!("{} wins", name));
        }
        if self.is_full() {
            self.board.next = None;
            return Some("Draw".to_string());
        }
        self.board.next = Some(1 - mark);
        None
    }

    fn seat_name(&self, mark: u8) -> String {
        let seat = if self.mode == GameMode::Test { 0 } else { mark as usize };
        let name = self.names.get(seat).cloned().unwrap_or_default();
        match self.mode {
            GameMode::Test => format!("{} ({})", name, if mark == 0 { 'X' } else { 'O' }),
            _ => name,
        }
    }

    fn board_event(&self) -> Result<GameEvent, GameError> {
        Ok(GameEvent::Broadcast(GamePayload::pack(BOARD, &self.board)?))
    }

    fn seat_for(&self, mark: u8) -> usize {
        match self.mode {
            GameMode::Test => 0,
            _ => mark as usize,
        }
    }
}

impl GameLogic for TicTacToe {
    fn initialize(&mut self, roster: &[Player]) -> Result<Vec<GameEvent>, GameError> {
        if roster.len() != self.seats() {
            return Err(GameError::Fault(format!(
                "{} needs {} participants in {:?} mode, got {}",
                NAME,
                self.seats(),
                self.mode,
                roster.len()
            )));
        }

        self.names = roster.iter().map(|p| p.name.clone()).collect();
        self.ai_seats = roster.iter().map(|p| p.ai).collect();
        self.board.next = Some(0);

        Ok(vec![self.board_event()?, GameEvent::Turn(0)])
    }

    fn handle(&mut self, sender: usize, payload: &GamePayload) -> Result<Vec<GameEvent>, GameError> {
        if payload.kind != MOVE {
            return Err(GameError::IllegalMove(format!(
                "unknown payload kind '{}'",
                payload.kind
            )));
        }
        let Some(mark) = self.board.next else {
            return Err(GameError::IllegalMove("the game is over".to_string()));
        };
        if self.seat_for(mark) != sender {
            return Err(GameError::IllegalMove("it is not your turn".to_string()));
        }

        let Move { cell } = payload.unpack()?;
        self.place(cell as usize, mark)?;

        let mut events = Vec::new();
        if let Some(reason) = self.settle(mark) {
            events.push(self.board_event()?);
            events.push(GameEvent::Finished(reason));
            return Ok(events);
        }

        let next = 1 - mark;
        if self.ai_seats.get(next as usize).copied().unwrap_or(false) {
            if let Some(cell) = self.board.cells.iter().position(Option::is_none) {
                self.place(cell, next)?;
                if let Some(reason) = self.settle(next) {
                    events.push(self.board_event()?);
                    events.push(GameEvent::Finished(reason));
                    return Ok(events);
                }
            }
        }

        events.push(self.board_event()?);
        if let Some(mark) = self.board.next {
            events.push(GameEvent::Turn(self.seat_for(mark)));
        }
        Ok(events)
    }
}
