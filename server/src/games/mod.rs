//! Game types linked into the server binary.

pub mod tictactoe;
