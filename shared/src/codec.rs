//! Line codec for [`Envelope`]s.
//!
//! One envelope is one line of compact JSON. Encoding and decoding are each
//! attempted up to [`CODEC_ATTEMPTS`] times. When all attempts fail the
//! caller gets a `ForceClose` message describing the failure instead of an
//! error. Successful conversions are mirrored to the `audit` log target.

use log::{debug, error, trace, warn};
use thiserror::Error;

use crate::message::{Envelope, Message, MessageKind};

/// Attempts made by [`encode`] and [`decode`] before giving up.
pub const CODEC_ATTEMPTS: usize = 5;

/// Emitted when even the `ForceClose` fallback cannot be serialized.
const FALLBACK_FORCE_CLOSE: &str =
    r#"{"message":{"type":"ForceClose","reason":"Message could not be encoded"}}"#;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to decode message: {0}")]
    Decode(serde_json::Error),

    #[error("encoded {0} message contains a line break")]
    EmbeddedLineBreak(&'static str),
}

fn with_retry<T, F>(operation: &str, mut op: F) -> Result<T, CodecError>
where
    F: FnMut() -> Result<T, CodecError>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < CODEC_ATTEMPTS => {
                debug!("{} attempt {} failed: {}", operation, attempt, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Serializes an envelope into a single line without the trailing newline.
pub fn try_encode(envelope: &Envelope) -> Result<String, CodecError> {
    let kind = envelope.type_name();
    with_retry("encode", || {
        let line =
            serde_json::to_string(envelope).map_err(|source| CodecError::Encode { kind, source })?;
        if line.contains(['\n', '\r']) {
            return Err(CodecError::EmbeddedLineBreak(kind));
        }
        Ok(line)
    })
}

/// Parses one line into an envelope.
pub fn try_decode(line: &str) -> Result<Envelope, CodecError> {
    let line = line.trim_end_matches(['\r', '\n']);
    with_retry("decode", || {
        serde_json::from_str::<Envelope>(line).map_err(CodecError::Decode)
    })
}

/// Encodes an envelope, degrading to a `ForceClose` line on failure.
pub fn encode(envelope: &Envelope) -> String {
    match try_encode(envelope) {
        Ok(line) => {
            trace!(target: "audit", "encoded {}: {}", envelope.type_name(), line);
            line
        }
        Err(e) => {
            error!("Giving up on encoding after {} attempts: {}", CODEC_ATTEMPTS, e);
            let fallback = Envelope::new(Message::force_close(format!(
                "Server could not encode message: {}",
                e
            )));
            serde_json::to_string(&fallback).unwrap_or_else(|_| FALLBACK_FORCE_CLOSE.to_string())
        }
    }
}

/// Decodes a line, degrading to a `ForceClose` envelope on failure.
pub fn decode(line: &str) -> Envelope {
    match try_decode(line) {
        Ok(envelope) => {
            trace!(target: "audit", "decoded {}: {}", envelope.type_name(), line.trim_end());
            envelope
        }
        Err(e) => {
            warn!("Giving up on decoding after {} attempts: {}", CODEC_ATTEMPTS, e);
            Envelope::new(Message::force_close(format!("Could not decode message: {}", e)))
        }
    }
}

/// Decodes a line that must hold a message of kind `expected`.
///
/// A `ForceClose` is passed through untouched; any other kind is replaced
/// by a `ForceClose` naming both kinds.
pub fn decode_expecting(line: &str, expected: MessageKind) -> Envelope {
    let envelope = decode(line);
    let received = envelope.message.kind();
    if received == expected || received == MessageKind::ForceClose {
        return envelope;
    }

    warn!("Expected {} message but received {}", expected, received);
    Envelope::new(Message::force_close(format!(
        "Expected {} but received {}",
        expected, received
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{GameMode, JoinType};
    use crate::player::Player;

    #[test]
    fn test_encode_is_single_line() {
        let envelope = Envelope::new(Message::exception(
            "Initialization failed",
            "line one\nline two\r\nline three",
        ));

        let line = encode(&envelope);
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));

        let back = decode(&line);
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_decode_accepts_trailing_newline() {
        let line = format!("{}\r\n", encode(&Envelope::new(Message::KeepAlive)));
        assert_eq!(decode(&line).message, Message::KeepAlive);
    }

    #[test]
    fn test_decode_keeps_player_reference() {
        let mut player = Player::new("bob", "Bob", None);
        player.id = 3;
        let envelope = Envelope::for_player(
            player,
            Message::Join {
                game_type: "TicTacToe".to_string(),
                mode: GameMode::SinglePlayer,
                join_type: JoinType::Auto,
                party_name: Some("p1".to_string()),
                private: true,
            },
        );

        let back = decode(&encode(&envelope));
        let player = back.player.unwrap();
        assert_eq!(player.id, 3);
        assert_eq!(player.name, "Bob");
    }

    #[test]
    fn test_garbage_degrades_to_force_close() {
        let envelope = decode("this is not json");
        match envelope.message {
            Message::ForceClose { reason } => assert!(reason.contains("Could not decode")),
            other => panic!("Expected ForceClose, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_degrades_to_force_close() {
        let envelope = decode(r#"{"message":{"type":"Teleport"}}"#);
        assert_eq!(envelope.message.kind(), MessageKind::ForceClose);
    }

    #[test]
    fn test_decode_expecting_matching_kind() {
        let line = encode(&Envelope::new(Message::KeepAlive));
        let envelope = decode_expecting(&line, MessageKind::KeepAlive);
        assert_eq!(envelope.message, Message::KeepAlive);
    }

    #[test]
    fn test_decode_expecting_other_kind() {
        let line = encode(&Envelope::new(Message::ListGames));
        let envelope = decode_expecting(&line, MessageKind::Identify);

        match envelope.message {
            Message::ForceClose { reason } => {
                assert!(reason.contains("Identify"));
                assert!(reason.contains("ListGames"));
            }
            other => panic!("Expected ForceClose, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_stops_after_bound() {
        let mut calls = 0;
        let result: Result<(), CodecError> = with_retry("test", || {
            calls += 1;
            Err(CodecError::EmbeddedLineBreak("KeepAlive"))
        });

        assert!(result.is_err());
        assert_eq!(calls, CODEC_ATTEMPTS);
    }

    #[test]
    fn test_retry_recovers_from_cold_start() {
        let mut calls = 0;
        let result = with_retry("test", || {
            calls += 1;
            if calls < 3 {
                Err(CodecError::EmbeddedLineBreak("KeepAlive"))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(result.unwrap(), 3);
    }
}
