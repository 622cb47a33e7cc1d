use tokio::sync::mpsc;

use crate::codec;
use crate::message::{Envelope, Message};

/// Sending half of a client connection.
///
/// Each envelope is encoded into one complete line before it is queued, and
/// a single writer task drains the queue onto the socket, so lines sent from
/// different tasks never interleave.
#[derive(Debug, Clone)]
pub struct Connection {
    sender: mpsc::UnboundedSender<String>,
}

impl Connection {
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self { sender }
    }

    /// Creates a connection together with the receiver its writer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    pub fn send(&self, envelope: &Envelope) -> bool {
        self.sender.send(codec::encode(envelope)).is_ok()
    }

    pub fn send_message(&self, message: Message) -> bool {
        self.send(&Envelope::new(message))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_arrive_in_order() {
        let (connection, mut rx) = Connection::channel();
        let cloned = connection.clone();

        assert!(connection.send_message(Message::KeepAlive));
        assert!(cloned.send_message(Message::force_close("done")));

        let first = codec::decode(&rx.try_recv().unwrap());
        let second = codec::decode(&rx.try_recv().unwrap());
        assert_eq!(first.message, Message::KeepAlive);
        assert_eq!(second.message, Message::force_close("done"));
    }

    #[test]
    fn test_writer_drains_until_all_senders_drop() {
        let (connection, mut rx) = Connection::channel();
        let cloned = connection.clone();
        connection.send_message(Message::Goodbye);
        drop(connection);
        drop(cloned);

        tokio_test::block_on(async {
            let line = rx.recv().await.unwrap();
            assert!(line.contains("Goodbye"));
            assert!(rx.recv().await.is_none());
        });
    }

    #[test]
    fn test_send_after_close_fails() {
        let (connection, rx) = Connection::channel();
        drop(rx);

        assert!(connection.is_closed());
        assert!(!connection.send_message(Message::KeepAlive));
    }
}
