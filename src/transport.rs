//! Transport adapters: ordered, reliable, bidirectional message channels.
//!
//! A `Transport` is one side of a channel between exactly one client and one
//! server endpoint. The core consumes transports, it does not implement
//! them; the two adapters here cover tests/embedding (`pair`) and child
//! processes (`stdio`). Half-close is supported: dropping the send half
//! while continuing to receive streamed notifications.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::logging;
use crate::protocol::{decode_message, encode_message, Message};

const CHANNEL_CAPACITY: usize = 64;

/// One side of an ordered, reliable, bidirectional `Message` stream.
pub struct Transport {
    tx: mpsc::Sender<Message>,
    rx: mpsc::Receiver<Message>,
}

impl Transport {
    /// An in-memory duplex pair: everything sent on one side arrives, in
    /// order, on the other.
    pub fn pair() -> (Transport, Transport) {
        let (a_tx, a_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (b_tx, b_rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Transport { tx: a_tx, rx: b_rx },
            Transport { tx: b_tx, rx: a_rx },
        )
    }

    /// Newline-delimited JSON over this process's stdin/stdout, with
    /// dedicated reader and writer tasks. Undecodable input lines are logged
    /// and dropped rather than tearing down the stream.
    pub fn stdio() -> Transport {
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Message>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(msg) = out_rx.recv().await {
                let line = encode_message(&msg);
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.flush().await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut reader = BufReader::new(tokio::io::stdin());
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match decode_message(&line) {
                            Ok(msg) => {
                                if in_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                logging::warn(&format!("Dropping undecodable frame: {}", e));
                            }
                        }
                    }
                    Err(_) => break,
                }
            }
        });

        Transport {
            tx: out_tx,
            rx: in_rx,
        }
    }

    /// Split into the send half (cloneable) and the receive half. The core
    /// endpoints consume transports this way: one writer shared across
    /// tasks, one router owning the inbound stream.
    pub fn into_split(self) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        (self.tx, self.rx)
    }

    /// Send one message. Fails once the peer is gone.
    pub async fn send(&self, msg: Message) -> Result<(), TransportClosed> {
        self.tx.send(msg).await.map_err(|_| TransportClosed)
    }

    /// Receive the next message; `None` once the peer closed its send half.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }
}

/// The peer endpoint is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transport closed")]
pub struct TransportClosed;
