//! Wire protocol shared by the game server and its clients.
//!
//! Every message travels as one line of JSON text. The root type is
//! [`Envelope`], which carries an optional [`Player`] reference and a
//! [`Message`] whose `"type"` field is the message's type identity.
//! Game-specific traffic is wrapped in [`GamePayload`], an opaque blob that
//! only the owning game module interprets.
//!
//! The [`codec`] module turns envelopes into lines and back. Decoding never
//! hands a raw error to the caller: an undecodable line becomes a
//! [`Message::ForceClose`] carrying the diagnostic, so every reader must be
//! ready to see a termination signal in place of the message it expected.

pub mod codec;
pub mod connection;
pub mod message;
pub mod player;

pub use codec::{decode, decode_expecting, encode, CodecError, CODEC_ATTEMPTS};
pub use connection::Connection;
pub use message::{Envelope, GameMode, GamePayload, JoinType, Message, MessageKind};
pub use player::Player;

/// Port the server listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 8080;

/// Seconds between two keep-alive probes unless configured otherwise.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 10;
